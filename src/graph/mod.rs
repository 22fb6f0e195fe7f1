//! Dependency graph over extracted entities.
//!
//! ## Architecture
//!
//! ```text
//! ExtractedModel ──► builder::build ──► DependencyGraph (petgraph::UnGraph)
//!                                            │
//!                                        metrics::compute
//!                                            │
//!                                     CouplingMetrics
//! ```
//!
//! ## Modules
//!
//! - [`models`]: `DependencyGraph`, `EntityNode`, `CouplingMetrics`
//! - [`builder`]: validation + weight aggregation
//! - [`metrics`]: degree, fan-in/out, instability, components

pub mod builder;
pub mod metrics;
pub mod models;

pub use builder::{build, build_from_model};
pub use metrics::{compute as compute_metrics, most_coupled_member};
pub use models::{CouplingMetrics, DependencyGraph, EntityCoupling, EntityNode};
