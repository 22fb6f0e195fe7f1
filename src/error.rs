//! Error taxonomy for the decomposition engine.
//!
//! Every failure the engine surfaces is a [`DecompositionError`]. Variants
//! carry the offending entity/service ids so a reviewer can act on them.
//! [`DecompositionError::category`] groups variants into the propagation
//! classes the pipeline reacts to.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{EntityId, ServiceId, UnitId};

/// What kind of identifier an [`DecompositionError::InvalidReference`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Entity,
    Service,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entity => write!(f, "entity"),
            Self::Service => write!(f, "service"),
        }
    }
}

/// Propagation class of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed input or unknown references; surfaced to the caller.
    Input,
    /// Token ceiling reached; triggers graceful degradation.
    Budget,
    /// Edit raced with another reviewer; retry against fresh state.
    Concurrency,
    /// Generation blocked until the plan is finalized.
    GenerationPrecondition,
    /// Advisory classifier failed; callers fall back.
    ExternalUnavailable,
    /// Rendering, serialization or filesystem failure.
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecompositionError {
    #[error("Relationship from entity {from} references unknown entity {missing}")]
    UnknownEntityReference { from: EntityId, missing: EntityId },

    #[error("Entity id {0} appears more than once in the extracted model")]
    DuplicateEntityId(EntityId),

    #[error("Cannot resolve service boundaries for an empty entity set")]
    EmptyEntitySet,

    #[error("Unparsable source {path}: {reason}")]
    UnparsableSource { path: String, reason: String },

    #[error(
        "Token budget exceeded by unit {unit_id}: {requested} tokens requested, {used} of {ceiling} already used"
    )]
    BudgetExceeded {
        unit_id: UnitId,
        requested: u64,
        used: u64,
        ceiling: u64,
    },

    #[error("Entity {entity} would be assigned twice ({context})")]
    DuplicateAssignment { entity: EntityId, context: String },

    #[error("Unknown {kind} reference: {id}")]
    InvalidReference { kind: ReferenceKind, id: String },

    #[error("Edit would leave entity {entity} of {service} unassigned; route it to unassigned_entities explicitly")]
    WouldOrphanEntity { entity: EntityId, service: ServiceId },

    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    #[error("Service name '{name}' is already used by {existing}")]
    DuplicateServiceName { name: String, existing: ServiceId },

    #[error("Stale plan version: edit targeted version {expected}, current version is {current}")]
    StalePlanVersion { expected: u64, current: u64 },

    #[error("Plan is incomplete: {} entities unassigned ({})", .unassigned.len(), join_ids(.unassigned))]
    IncompletePlan { unassigned: Vec<EntityId> },

    #[error("Naming collision: identifier '{identifier}' derived from both '{first}' and '{second}'")]
    NamingCollision {
        identifier: String,
        first: String,
        second: String,
    },

    #[error("Advisory classifier unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("Template rendering failed for {artifact}: {message}")]
    Template { artifact: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_ids(ids: &[EntityId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl DecompositionError {
    pub fn unknown_entity(id: EntityId) -> Self {
        Self::InvalidReference {
            kind: ReferenceKind::Entity,
            id: id.to_string(),
        }
    }

    pub fn unknown_service(id: ServiceId) -> Self {
        Self::InvalidReference {
            kind: ReferenceKind::Service,
            id: id.to_string(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownEntityReference { .. }
            | Self::DuplicateEntityId(_)
            | Self::EmptyEntitySet
            | Self::UnparsableSource { .. }
            | Self::DuplicateAssignment { .. }
            | Self::InvalidReference { .. }
            | Self::WouldOrphanEntity { .. }
            | Self::InvalidEdit(_)
            | Self::DuplicateServiceName { .. } => ErrorCategory::Input,
            Self::BudgetExceeded { .. } => ErrorCategory::Budget,
            Self::StalePlanVersion { .. } => ErrorCategory::Concurrency,
            Self::IncompletePlan { .. } | Self::NamingCollision { .. } => {
                ErrorCategory::GenerationPrecondition
            }
            Self::ExternalUnavailable(_) => ErrorCategory::ExternalUnavailable,
            Self::Template { .. }
            | Self::Serialization(_)
            | Self::Io { .. }
            | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Budget, concurrency and advisor failures are recovered by the engine
    /// or the caller; everything else needs a corrected input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Budget | ErrorCategory::Concurrency | ErrorCategory::ExternalUnavailable
        )
    }
}

impl From<serde_json::Error> for DecompositionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for DecompositionError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for engine operations.
pub type DecompositionResult<T> = Result<T, DecompositionError>;
