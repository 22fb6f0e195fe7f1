//! Versioned plan store with compare-and-swap edit acceptance.
//!
//! Readers get an `Arc` snapshot of the current plan and never observe a
//! partially applied edit. Writers name the version they edited; a stale
//! version fails with `StalePlanVersion`. Undo/redo restore earlier plan
//! contents under a fresh version number, so versions only move forward.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use super::edit::PlanEdit;
use super::editor::PlanEditor;
use super::models::DecompositionPlan;
use super::persistence::PlanSnapshot;
use crate::error::{DecompositionError, DecompositionResult};

#[derive(Debug)]
struct StoreState {
    current: Arc<DecompositionPlan>,
    undo: Vec<Arc<DecompositionPlan>>,
    redo: Vec<Arc<DecompositionPlan>>,
    ui_state: serde_json::Value,
}

/// Single writer of the shared plan during the review phase.
#[derive(Debug)]
pub struct PlanStore {
    editor: PlanEditor,
    state: RwLock<StoreState>,
}

impl PlanStore {
    pub fn new(editor: PlanEditor, initial: DecompositionPlan) -> Self {
        Self {
            editor,
            state: RwLock::new(StoreState {
                current: Arc::new(initial),
                undo: Vec::new(),
                redo: Vec::new(),
                ui_state: serde_json::Value::Null,
            }),
        }
    }

    /// Restore a store from a persisted snapshot (history is not persisted).
    pub fn from_snapshot(editor: PlanEditor, snapshot: PlanSnapshot) -> Self {
        let store = Self::new(editor, snapshot.plan);
        store.state.write().ui_state = snapshot.ui_state;
        store
    }

    pub fn current(&self) -> Arc<DecompositionPlan> {
        Arc::clone(&self.state.read().current)
    }

    pub fn version(&self) -> u64 {
        self.state.read().current.version
    }

    /// Apply `edit` if `expected_version` is still current.
    pub fn apply(
        &self,
        expected_version: u64,
        edit: &PlanEdit,
    ) -> DecompositionResult<Arc<DecompositionPlan>> {
        let mut state = self.state.write();
        check_version(&state, expected_version)?;

        let next = match self.editor.apply(&state.current, edit) {
            Ok(plan) => Arc::new(plan),
            Err(e) => {
                warn!(op = edit.op(), version = expected_version, error = %e, "Plan edit rejected");
                return Err(e);
            }
        };
        let previous = std::mem::replace(&mut state.current, Arc::clone(&next));
        state.undo.push(previous);
        state.redo.clear();
        Ok(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.state.read().undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.state.read().redo.is_empty()
    }

    /// Restore the plan contents preceding the last accepted edit.
    pub fn undo(&self, expected_version: u64) -> DecompositionResult<Arc<DecompositionPlan>> {
        let mut state = self.state.write();
        check_version(&state, expected_version)?;
        let Some(previous) = state.undo.pop() else {
            return Err(DecompositionError::InvalidEdit("nothing to undo".into()));
        };
        let restored = Arc::new(DecompositionPlan {
            version: state.current.version + 1,
            ..(*previous).clone()
        });
        let replaced = std::mem::replace(&mut state.current, Arc::clone(&restored));
        state.redo.push(replaced);
        info!(version = restored.version, "Plan edit undone");
        Ok(restored)
    }

    /// Re-apply the plan contents removed by the last undo.
    pub fn redo(&self, expected_version: u64) -> DecompositionResult<Arc<DecompositionPlan>> {
        let mut state = self.state.write();
        check_version(&state, expected_version)?;
        let Some(next) = state.redo.pop() else {
            return Err(DecompositionError::InvalidEdit("nothing to redo".into()));
        };
        let restored = Arc::new(DecompositionPlan {
            version: state.current.version + 1,
            ..(*next).clone()
        });
        let replaced = std::mem::replace(&mut state.current, Arc::clone(&restored));
        state.undo.push(replaced);
        info!(version = restored.version, "Plan edit redone");
        Ok(restored)
    }

    /// The current plan as immutable generator input; fails with
    /// `IncompletePlan` while entities remain unassigned.
    pub fn finalize(&self) -> DecompositionResult<Arc<DecompositionPlan>> {
        let current = self.current();
        if !current.is_valid() {
            return Err(DecompositionError::IncompletePlan {
                unassigned: current.unassigned_entities.iter().copied().collect(),
            });
        }
        info!(version = current.version, services = current.services.len(), "Plan finalized");
        Ok(current)
    }

    /// Opaque review-UI state stored next to the plan.
    pub fn ui_state(&self) -> serde_json::Value {
        self.state.read().ui_state.clone()
    }

    pub fn set_ui_state(&self, value: serde_json::Value) {
        self.state.write().ui_state = value;
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        let state = self.state.read();
        PlanSnapshot {
            plan: (*state.current).clone(),
            ui_state: state.ui_state.clone(),
        }
    }
}

fn check_version(state: &StoreState, expected: u64) -> DecompositionResult<()> {
    let current = state.current.version;
    if current != expected {
        return Err(DecompositionError::StalePlanVersion { expected, current });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, ServiceId};
    use crate::plan::EditTarget;
    use crate::test_helpers::{plan_of, shop_graph};

    fn store() -> PlanStore {
        let graph = Arc::new(shop_graph());
        let plan = plan_of(&graph, &[("Accounts", vec![1, 2]), ("Catalog", vec![3])]);
        PlanStore::new(PlanEditor::new(graph), plan)
    }

    fn move_order_to_catalog() -> PlanEdit {
        PlanEdit::MoveEntity {
            entity: EntityId(2),
            to: EditTarget::Service(ServiceId(2)),
        }
    }

    #[test]
    fn test_cas_rejects_stale_version() {
        let store = store();
        let v1 = store.version();
        store.apply(v1, &move_order_to_catalog()).unwrap();

        let rename = PlanEdit::RenameService {
            service: ServiceId(1),
            name: "Users".into(),
        };
        let err = store.apply(v1, &rename).unwrap_err();
        assert_eq!(err, DecompositionError::StalePlanVersion { expected: 1, current: 2 });
        assert!(err.is_recoverable());

        store.apply(2, &rename).unwrap();
        assert_eq!(store.version(), 3);
    }

    #[test]
    fn test_failed_edit_leaves_plan_unchanged() {
        let store = store();
        let before = store.current();
        let bad = PlanEdit::MoveEntity {
            entity: EntityId(2),
            to: EditTarget::Service(ServiceId(7)),
        };
        assert!(store.apply(1, &bad).is_err());
        assert_eq!(*store.current(), *before);
        assert!(!store.can_undo());
    }

    #[test]
    fn test_undo_redo_move_versions_forward() {
        let store = store();
        let original = store.current();
        store.apply(1, &move_order_to_catalog()).unwrap();

        let undone = store.undo(2).unwrap();
        assert_eq!(undone.version, 3);
        assert_eq!(undone.services, original.services);
        assert!(store.can_redo());

        let redone = store.redo(3).unwrap();
        assert_eq!(redone.version, 4);
        assert!(redone.service(ServiceId(2)).unwrap().contains(EntityId(2)));

        assert!(matches!(store.redo(4), Err(DecompositionError::InvalidEdit(_))));
    }

    #[test]
    fn test_finalize_requires_valid_plan() {
        let store = store();
        store
            .apply(
                1,
                &PlanEdit::MoveEntity {
                    entity: EntityId(3),
                    to: EditTarget::Unassigned,
                },
            )
            .unwrap();
        assert_eq!(
            store.finalize().unwrap_err(),
            DecompositionError::IncompletePlan {
                unassigned: vec![EntityId(3)]
            }
        );
        store.undo(2).unwrap();
        assert!(store.finalize().is_ok());
    }

    #[test]
    fn test_ui_state_round_trips_through_snapshot() {
        let store = store();
        store.set_ui_state(serde_json::json!({"collapsed": ["svc-2"]}));
        let snapshot = store.snapshot();

        let graph = Arc::new(shop_graph());
        let restored = PlanStore::from_snapshot(PlanEditor::new(graph), snapshot);
        assert_eq!(restored.ui_state()["collapsed"][0], "svc-2");
        assert_eq!(*restored.current(), *store.current());
    }
}
