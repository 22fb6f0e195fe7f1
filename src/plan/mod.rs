//! Decomposition plan: models, edits, editor, versioned store, persistence.

pub mod edit;
pub mod editor;
pub mod models;
pub mod persistence;
pub mod store;

pub use edit::{EditTarget, PlanEdit};
pub use editor::PlanEditor;
pub use models::{
    service_name_key, DecompositionPlan, EdgeDirection, ExternalEdge, InternalEdge,
    MicroserviceCandidate,
};
pub use persistence::{load_snapshot, save_snapshot, PlanSnapshot};
pub use store::PlanStore;
