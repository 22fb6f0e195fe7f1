//! BoundaryAdvisor trait definition
//!
//! Abstract interface for the optional advisory classifier consulted by the
//! Boundary Resolver. Async trait + Send + Sync for `Arc<dyn BoundaryAdvisor>`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::EntityId;

/// Token counts reported (or estimated) for one advisor call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub prompt_tokens: u64,
    pub response_tokens: u64,
}

impl TokenCounts {
    pub fn new(prompt_tokens: u64, response_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            response_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.response_tokens)
    }
}

/// Anything an advisor returns that must be metered.
pub trait Metered {
    fn usage(&self) -> TokenCounts;
}

/// What the advisor sees of a candidate cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Smallest member id; stable key of the cluster
    pub key: EntityId,
    /// Member entity names, in id order
    pub entity_names: Vec<String>,
    /// Profiling descriptions of the members, when available
    pub descriptions: Vec<String>,
    /// Sum of edge weights inside the cluster
    pub internal_weight: u32,
    /// Sum of edge weights leaving the cluster
    pub external_weight: u32,
}

/// Advisor answer for a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub suggested_name: String,
    /// 0.0–1.0: how confident the advisor is that the cluster is cohesive
    pub confidence: f64,
    pub usage: TokenCounts,
}

impl Metered for Classification {
    fn usage(&self) -> TokenCounts {
        self.usage
    }
}

/// What the advisor sees of a single entity during profiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub entity_id: EntityId,
    pub name: String,
    /// `name: type` per attribute
    pub attributes: Vec<String>,
    /// Names of directly related entities
    pub related: Vec<String>,
    pub source_path: Option<String>,
}

/// Advisor answer for an entity profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescription {
    pub description: String,
    pub usage: TokenCounts,
}

impl Metered for EntityDescription {
    fn usage(&self) -> TokenCounts {
        self.usage
    }
}

/// Optional advisory classifier.
///
/// Callers must function correctly with no advisor at all; any error is
/// treated as absence by [`AdvisorGate`](super::AdvisorGate).
///
/// # Implementations
///
/// - [`HttpBoundaryAdvisor`](super::HttpBoundaryAdvisor): any OpenAI-compatible
///   `/v1/chat/completions` endpoint
/// - [`MockBoundaryAdvisor`](super::MockBoundaryAdvisor): scripted answers for tests
#[async_trait]
pub trait BoundaryAdvisor: Send + Sync {
    /// Validate and name a candidate cluster as a bounded context.
    async fn classify(&self, cluster: &ClusterSummary) -> Result<Classification>;

    /// Describe one entity's business role.
    async fn describe(&self, entity: &EntityProfile) -> Result<EntityDescription>;

    /// The model behind the advisor, for logs and reports.
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_counts_total_saturates() {
        assert_eq!(TokenCounts::new(40, 10).total(), 50);
        assert_eq!(TokenCounts::new(u64::MAX, 10).total(), u64::MAX);
    }
}
