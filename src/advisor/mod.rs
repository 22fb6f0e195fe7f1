//! Optional advisory classifier.
//!
//! Architecture:
//! - [`traits::BoundaryAdvisor`]: the abstract interface (async, Send + Sync)
//! - [`http::HttpBoundaryAdvisor`]: OpenAI-compatible chat completions client
//! - [`mock::MockBoundaryAdvisor`]: deterministic scripted advisor for tests
//! - [`gate::AdvisorGate`]: timeout, single retry, token metering, fallback

pub mod gate;
pub mod http;
pub mod mock;
pub mod traits;

pub use gate::{AdvisorGate, Consultation};
pub use http::HttpBoundaryAdvisor;
pub use mock::MockBoundaryAdvisor;
pub use traits::{
    BoundaryAdvisor, Classification, ClusterSummary, EntityDescription, EntityProfile, Metered,
    TokenCounts,
};
