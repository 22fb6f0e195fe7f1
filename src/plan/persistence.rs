//! Plan persistence for the review UI.
//!
//! A [`PlanSnapshot`] is the plan plus the UI's opaque state blob, stored
//! as pretty-printed JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::models::DecompositionPlan;
use crate::error::{DecompositionError, DecompositionResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan: DecompositionPlan,
    #[serde(default)]
    pub ui_state: serde_json::Value,
}

impl PlanSnapshot {
    pub fn new(plan: DecompositionPlan) -> Self {
        Self {
            plan,
            ui_state: serde_json::Value::Null,
        }
    }
}

pub fn save_snapshot(path: &Path, snapshot: &PlanSnapshot) -> DecompositionResult<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| DecompositionError::io(parent, e))?;
    }
    std::fs::write(path, json).map_err(|e| DecompositionError::io(path, e))?;
    debug!(path = %path.display(), version = snapshot.plan.version, "Plan snapshot saved");
    Ok(())
}

/// Load a snapshot; a bare plan document (no `plan` wrapper) is accepted too.
pub fn load_snapshot(path: &Path) -> DecompositionResult<PlanSnapshot> {
    let raw = std::fs::read_to_string(path).map_err(|e| DecompositionError::io(path, e))?;
    if let Ok(snapshot) = serde_json::from_str::<PlanSnapshot>(&raw) {
        return Ok(snapshot);
    }
    let plan: DecompositionPlan = serde_json::from_str(&raw)?;
    Ok(PlanSnapshot::new(plan))
}
