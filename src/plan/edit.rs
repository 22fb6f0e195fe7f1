//! Human edits accepted by the Plan Editor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::{EntityId, ServiceId};

/// Where a moved entity goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditTarget {
    Service(ServiceId),
    /// Explicitly park the entity in `unassigned_entities`
    Unassigned,
}

/// One reviewer edit. Serialized with an `op` tag, e.g.
/// `{"op": "move_entity", "entity": 2, "to": {"service": 3}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanEdit {
    MoveEntity {
        entity: EntityId,
        to: EditTarget,
    },
    RenameService {
        service: ServiceId,
        name: String,
    },
    /// `keep` stays in `service`; `split_off` becomes a new service.
    /// Together they must cover the service's members exactly.
    SplitService {
        service: ServiceId,
        keep: BTreeSet<EntityId>,
        split_off: BTreeSet<EntityId>,
        new_name: String,
    },
    /// Only empty services can be deleted.
    DeleteService {
        service: ServiceId,
    },
    /// Move every member of `source` into `target` and drop `source`.
    MergeServices {
        target: ServiceId,
        source: ServiceId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl PlanEdit {
    /// Short operation name for logs.
    pub fn op(&self) -> &'static str {
        match self {
            Self::MoveEntity { .. } => "move_entity",
            Self::RenameService { .. } => "rename_service",
            Self::SplitService { .. } => "split_service",
            Self::DeleteService { .. } => "delete_service",
            Self::MergeServices { .. } => "merge_services",
        }
    }
}
