//! Plan Editor
//!
//! Validates an edit against a plan and, when valid, returns a new plan
//! value. The input plan is never mutated; on error the caller still holds
//! the unchanged original.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::edit::{EditTarget, PlanEdit};
use super::models::{service_name_key, DecompositionPlan, MicroserviceCandidate};
use crate::error::{DecompositionError, DecompositionResult};
use crate::graph::DependencyGraph;
use crate::model::{EntityId, ServiceId};

/// Applies [`PlanEdit`]s; needs the graph to recompute service edges.
#[derive(Debug, Clone)]
pub struct PlanEditor {
    graph: Arc<DependencyGraph>,
}

impl PlanEditor {
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Validate and apply one edit, yielding the next plan version.
    pub fn apply(
        &self,
        plan: &DecompositionPlan,
        edit: &PlanEdit,
    ) -> DecompositionResult<DecompositionPlan> {
        let mut next = plan.clone();

        match edit {
            PlanEdit::MoveEntity { entity, to } => self.move_entity(&mut next, *entity, *to)?,
            PlanEdit::RenameService { service, name } => {
                let name = validate_name(&next, name, &[*service])?;
                service_mut(&mut next, *service)?.proposed_name = name;
            }
            PlanEdit::SplitService {
                service,
                keep,
                split_off,
                new_name,
            } => self.split_service(&mut next, *service, keep, split_off, new_name)?,
            PlanEdit::DeleteService { service } => {
                let existing = service_ref(&next, *service)?;
                if let Some(first) = existing.member_entity_ids.iter().next() {
                    return Err(DecompositionError::WouldOrphanEntity {
                        entity: *first,
                        service: *service,
                    });
                }
                next.services.retain(|s| s.id != *service);
            }
            PlanEdit::MergeServices {
                target,
                source,
                name,
            } => {
                if target == source {
                    return Err(DecompositionError::InvalidEdit(format!(
                        "cannot merge {} into itself",
                        target
                    )));
                }
                let moved = service_ref(&next, *source)?.member_entity_ids.clone();
                service_ref(&next, *target)?;
                let name = match name {
                    Some(n) => Some(validate_name(&next, n, &[*target, *source])?),
                    None => None,
                };
                let dest = service_mut(&mut next, *target)?;
                dest.member_entity_ids.extend(moved);
                if let Some(name) = name {
                    dest.proposed_name = name;
                }
                next.services.retain(|s| s.id != *source);
            }
        }

        next.recompute_edges(&self.graph);
        let all: BTreeSet<EntityId> = self.graph.entity_ids().collect();
        next.check_partition(&all)?;
        next.version = plan.version + 1;

        info!(op = edit.op(), version = next.version, "Plan edit applied");
        Ok(next)
    }

    fn move_entity(
        &self,
        plan: &mut DecompositionPlan,
        entity: EntityId,
        to: EditTarget,
    ) -> DecompositionResult<()> {
        if !self.graph.contains(entity) {
            return Err(DecompositionError::unknown_entity(entity));
        }
        if let EditTarget::Service(target) = to {
            service_ref(plan, target)?;
        }

        let current = plan.service_of(entity);
        match (current, to) {
            (Some(from), EditTarget::Service(target)) if from == target => {
                return Err(DecompositionError::InvalidEdit(format!(
                    "entity {} is already in {}",
                    entity, target
                )));
            }
            (None, EditTarget::Unassigned) => {
                return Err(DecompositionError::InvalidEdit(format!(
                    "entity {} is already unassigned",
                    entity
                )));
            }
            _ => {}
        }

        match current {
            Some(from) => {
                service_mut(plan, from)?.member_entity_ids.remove(&entity);
            }
            None => {
                plan.unassigned_entities.remove(&entity);
            }
        }
        match to {
            EditTarget::Service(target) => {
                service_mut(plan, target)?.member_entity_ids.insert(entity);
            }
            EditTarget::Unassigned => {
                plan.unassigned_entities.insert(entity);
            }
        }
        debug!(entity = %entity, ?current, ?to, "Entity moved");
        Ok(())
    }

    fn split_service(
        &self,
        plan: &mut DecompositionPlan,
        service: ServiceId,
        keep: &BTreeSet<EntityId>,
        split_off: &BTreeSet<EntityId>,
        new_name: &str,
    ) -> DecompositionResult<()> {
        let members = service_ref(plan, service)?.member_entity_ids.clone();

        if split_off.is_empty() || keep.is_empty() {
            return Err(DecompositionError::InvalidEdit(format!(
                "split of {} needs non-empty keep and split_off sets",
                service
            )));
        }
        if let Some(both) = keep.intersection(split_off).next() {
            return Err(DecompositionError::DuplicateAssignment {
                entity: *both,
                context: format!("both halves of the split of {}", service),
            });
        }
        for entity in keep.iter().chain(split_off.iter()) {
            if members.contains(entity) {
                continue;
            }
            if !self.graph.contains(*entity) {
                return Err(DecompositionError::unknown_entity(*entity));
            }
            let place = plan
                .service_of(*entity)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unassigned_entities".to_string());
            return Err(DecompositionError::DuplicateAssignment {
                entity: *entity,
                context: format!("{} and the split of {}", place, service),
            });
        }
        if let Some(orphan) = members
            .iter()
            .find(|e| !keep.contains(e) && !split_off.contains(e))
        {
            return Err(DecompositionError::WouldOrphanEntity {
                entity: *orphan,
                service,
            });
        }

        let name = validate_name(plan, new_name, &[])?;
        let new_id = plan.next_service_id();
        service_mut(plan, service)?.member_entity_ids = keep.clone();
        plan.services
            .push(MicroserviceCandidate::new(new_id, name, split_off.clone()));
        Ok(())
    }
}

fn service_ref(
    plan: &DecompositionPlan,
    id: ServiceId,
) -> DecompositionResult<&MicroserviceCandidate> {
    plan.service(id)
        .ok_or_else(|| DecompositionError::unknown_service(id))
}

fn service_mut(
    plan: &mut DecompositionPlan,
    id: ServiceId,
) -> DecompositionResult<&mut MicroserviceCandidate> {
    plan.service_mut(id)
        .ok_or_else(|| DecompositionError::unknown_service(id))
}

/// Trimmed, non-empty, and unique among services other than `except`.
fn validate_name(
    plan: &DecompositionPlan,
    name: &str,
    except: &[ServiceId],
) -> DecompositionResult<String> {
    let name = name.trim();
    if !name.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(DecompositionError::InvalidEdit(
            "service name must contain at least one ASCII letter or digit".into(),
        ));
    }
    let key = service_name_key(name);
    if let Some(existing) = plan
        .services
        .iter()
        .find(|s| !except.contains(&s.id) && service_name_key(&s.proposed_name) == key)
    {
        return Err(DecompositionError::DuplicateServiceName {
            name: name.to_string(),
            existing: existing.id,
        });
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{plan_of, shop_graph};

    fn editor() -> PlanEditor {
        PlanEditor::new(Arc::new(shop_graph()))
    }

    fn ids(raw: &[u64]) -> BTreeSet<EntityId> {
        raw.iter().copied().map(EntityId).collect()
    }

    #[test]
    fn test_move_entity() {
        let ed = editor();
        let plan = plan_of(ed.graph(), &[("Accounts", vec![1, 2]), ("Catalog", vec![3])]);
        let next = ed
            .apply(
                &plan,
                &PlanEdit::MoveEntity {
                    entity: EntityId(2),
                    to: EditTarget::Service(ServiceId(2)),
                },
            )
            .unwrap();

        assert_eq!(next.version, plan.version + 1);
        assert_eq!(next.service(ServiceId(1)).unwrap().member_entity_ids, ids(&[1]));
        assert_eq!(next.service(ServiceId(2)).unwrap().member_entity_ids, ids(&[2, 3]));
        assert!(next.unassigned_entities.is_empty());
        // Order → User is now cross-service.
        assert_eq!(next.service(ServiceId(2)).unwrap().outbound_edges().count(), 1);
        // Original untouched.
        assert_eq!(plan.service(ServiceId(1)).unwrap().member_entity_ids, ids(&[1, 2]));
    }

    #[test]
    fn test_move_to_missing_service_is_invalid_reference() {
        let ed = editor();
        let plan = plan_of(ed.graph(), &[("Accounts", vec![1, 2]), ("Catalog", vec![3])]);
        let err = ed
            .apply(
                &plan,
                &PlanEdit::MoveEntity {
                    entity: EntityId(2),
                    to: EditTarget::Service(ServiceId(9)),
                },
            )
            .unwrap_err();
        assert_eq!(err, DecompositionError::unknown_service(ServiceId(9)));

        let err = ed
            .apply(
                &plan,
                &PlanEdit::MoveEntity {
                    entity: EntityId(42),
                    to: EditTarget::Unassigned,
                },
            )
            .unwrap_err();
        assert_eq!(err, DecompositionError::unknown_entity(EntityId(42)));
    }

    #[test]
    fn test_move_to_unassigned_and_back() {
        let ed = editor();
        let plan = plan_of(ed.graph(), &[("Accounts", vec![1, 2]), ("Catalog", vec![3])]);
        let parked = ed
            .apply(
                &plan,
                &PlanEdit::MoveEntity {
                    entity: EntityId(3),
                    to: EditTarget::Unassigned,
                },
            )
            .unwrap();
        assert!(!parked.is_valid());
        assert!(parked.service(ServiceId(2)).unwrap().member_entity_ids.is_empty());

        let back = ed
            .apply(
                &parked,
                &PlanEdit::MoveEntity {
                    entity: EntityId(3),
                    to: EditTarget::Service(ServiceId(1)),
                },
            )
            .unwrap();
        assert!(back.is_valid());
        assert_eq!(back.version, 3);
    }

    #[test]
    fn test_rename_rejects_duplicate_name() {
        let ed = editor();
        let plan = plan_of(ed.graph(), &[("Accounts", vec![1, 2]), ("Catalog", vec![3])]);
        let err = ed
            .apply(
                &plan,
                &PlanEdit::RenameService {
                    service: ServiceId(1),
                    name: "catalog".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DecompositionError::DuplicateServiceName { existing: ServiceId(2), .. }
        ));

        // Renaming to its own name (different case) is fine.
        let next = ed
            .apply(
                &plan,
                &PlanEdit::RenameService {
                    service: ServiceId(1),
                    name: "  ACCOUNTS ".into(),
                },
            )
            .unwrap();
        assert_eq!(next.service(ServiceId(1)).unwrap().proposed_name, "ACCOUNTS");
    }

    #[test]
    fn test_rename_rejects_names_with_same_identifier() {
        let ed = editor();
        let plan = plan_of(ed.graph(), &[("Café", vec![1, 2]), ("Catalog", vec![3])]);
        // Both derive the `caf` identifier in generated code.
        let err = ed
            .apply(
                &plan,
                &PlanEdit::RenameService {
                    service: ServiceId(2),
                    name: "Caf".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DecompositionError::DuplicateServiceName { existing: ServiceId(1), .. }
        ));

        let err = ed
            .apply(
                &plan,
                &PlanEdit::RenameService {
                    service: ServiceId(2),
                    name: "éé!".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, DecompositionError::InvalidEdit(_)));
    }

    #[test]
    fn test_split_service() {
        let ed = editor();
        let plan = plan_of(ed.graph(), &[("Shop", vec![1, 2, 3])]);
        let next = ed
            .apply(
                &plan,
                &PlanEdit::SplitService {
                    service: ServiceId(1),
                    keep: ids(&[1, 2]),
                    split_off: ids(&[3]),
                    new_name: "Catalog".into(),
                },
            )
            .unwrap();
        assert_eq!(next.services.len(), 2);
        assert_eq!(next.services[1].id, ServiceId(2));
        assert_eq!(next.services[1].member_entity_ids, ids(&[3]));
    }

    #[test]
    fn test_split_validation() {
        let ed = editor();
        let plan = plan_of(ed.graph(), &[("Shop", vec![1, 2, 3])]);

        let orphan = ed.apply(
            &plan,
            &PlanEdit::SplitService {
                service: ServiceId(1),
                keep: ids(&[1]),
                split_off: ids(&[3]),
                new_name: "Catalog".into(),
            },
        );
        assert_eq!(
            orphan.unwrap_err(),
            DecompositionError::WouldOrphanEntity {
                entity: EntityId(2),
                service: ServiceId(1)
            }
        );

        let twice = ed.apply(
            &plan,
            &PlanEdit::SplitService {
                service: ServiceId(1),
                keep: ids(&[1, 2, 3]),
                split_off: ids(&[3]),
                new_name: "Catalog".into(),
            },
        );
        assert!(matches!(
            twice.unwrap_err(),
            DecompositionError::DuplicateAssignment { entity: EntityId(3), .. }
        ));
    }

    #[test]
    fn test_split_rejects_member_of_other_service() {
        let ed = editor();
        let plan = plan_of(ed.graph(), &[("Accounts", vec![1, 2]), ("Catalog", vec![3])]);
        let err = ed
            .apply(
                &plan,
                &PlanEdit::SplitService {
                    service: ServiceId(1),
                    keep: ids(&[1]),
                    split_off: ids(&[2, 3]),
                    new_name: "Orders".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DecompositionError::DuplicateAssignment { entity: EntityId(3), .. }
        ));
    }

    #[test]
    fn test_delete_only_empty_services() {
        let ed = editor();
        let plan = plan_of(ed.graph(), &[("Accounts", vec![1, 2]), ("Catalog", vec![3])]);
        let err = ed
            .apply(&plan, &PlanEdit::DeleteService { service: ServiceId(2) })
            .unwrap_err();
        assert_eq!(
            err,
            DecompositionError::WouldOrphanEntity {
                entity: EntityId(3),
                service: ServiceId(2)
            }
        );

        let emptied = ed
            .apply(
                &plan,
                &PlanEdit::MoveEntity {
                    entity: EntityId(3),
                    to: EditTarget::Service(ServiceId(1)),
                },
            )
            .unwrap();
        let deleted = ed
            .apply(&emptied, &PlanEdit::DeleteService { service: ServiceId(2) })
            .unwrap();
        assert_eq!(deleted.services.len(), 1);
        assert!(deleted.is_valid());
    }

    #[test]
    fn test_merge_services() {
        let ed = editor();
        let plan = plan_of(ed.graph(), &[("Accounts", vec![1, 2]), ("Catalog", vec![3])]);
        let merged = ed
            .apply(
                &plan,
                &PlanEdit::MergeServices {
                    target: ServiceId(1),
                    source: ServiceId(2),
                    name: Some("Catalog".into()),
                },
            )
            .unwrap();
        assert_eq!(merged.services.len(), 1);
        assert_eq!(merged.services[0].proposed_name, "Catalog");
        assert_eq!(merged.services[0].member_entity_ids, ids(&[1, 2, 3]));
        assert!(merged.services[0].external_edges.is_empty());
        assert_eq!(merged.services[0].internal_edges.len(), 2);

        let self_merge = ed.apply(
            &plan,
            &PlanEdit::MergeServices {
                target: ServiceId(1),
                source: ServiceId(1),
                name: None,
            },
        );
        assert!(matches!(self_merge, Err(DecompositionError::InvalidEdit(_))));
    }
}
