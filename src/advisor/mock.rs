//! Mock boundary advisor for tests
//!
//! Scripted, deterministic answers with no network access. Can also be told
//! to fail or hang so fallback paths can be exercised.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::traits::{
    BoundaryAdvisor, Classification, ClusterSummary, EntityDescription, EntityProfile, TokenCounts,
};
use crate::model::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Answer,
    Fail,
    Hang,
}

/// Deterministic mock advisor.
///
/// By default names a cluster `"{first member}Domain"` with confidence 0.9
/// and reports 40 prompt / 10 response tokens per call.
#[derive(Debug)]
pub struct MockBoundaryAdvisor {
    behaviour: Behaviour,
    confidence: f64,
    usage: TokenCounts,
    names: Mutex<BTreeMap<EntityId, String>>,
    vetoed: BTreeSet<EntityId>,
    classified: Mutex<Vec<Vec<String>>>,
    calls: AtomicUsize,
}

impl Default for MockBoundaryAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBoundaryAdvisor {
    pub fn new() -> Self {
        Self {
            behaviour: Behaviour::Answer,
            confidence: 0.9,
            usage: TokenCounts::new(40, 10),
            names: Mutex::new(BTreeMap::new()),
            vetoed: BTreeSet::new(),
            classified: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call returns an error.
    pub fn failing() -> Self {
        Self {
            behaviour: Behaviour::Fail,
            ..Self::new()
        }
    }

    /// Every call sleeps for an hour; only useful behind a timeout.
    pub fn hanging() -> Self {
        Self {
            behaviour: Behaviour::Hang,
            ..Self::new()
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_usage(mut self, prompt_tokens: u64, response_tokens: u64) -> Self {
        self.usage = TokenCounts::new(prompt_tokens, response_tokens);
        self
    }

    /// Answer `name` for the cluster keyed by `key`.
    pub fn with_name(self, key: EntityId, name: impl Into<String>) -> Self {
        self.names.lock().insert(key, name.into());
        self
    }

    /// Answer clusters keyed by `key` with zero confidence.
    pub fn with_veto(mut self, key: EntityId) -> Self {
        self.vetoed.insert(key);
        self
    }

    /// Member names of every cluster classified so far, in arrival order.
    pub fn classified(&self) -> Vec<Vec<String>> {
        self.classified.lock().clone()
    }

    /// Number of calls received (including failed ones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn behave(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Answer => Ok(()),
            Behaviour::Fail => anyhow::bail!("mock advisor failure"),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                anyhow::bail!("mock advisor woke up")
            }
        }
    }
}

#[async_trait]
impl BoundaryAdvisor for MockBoundaryAdvisor {
    async fn classify(&self, cluster: &ClusterSummary) -> Result<Classification> {
        self.behave().await?;
        self.classified.lock().push(cluster.entity_names.clone());
        let scripted = self.names.lock().get(&cluster.key).cloned();
        let suggested_name = scripted.unwrap_or_else(|| {
            let first = cluster.entity_names.first().map(String::as_str).unwrap_or("Core");
            format!("{}Domain", first)
        });
        let confidence = if self.vetoed.contains(&cluster.key) {
            0.0
        } else {
            self.confidence
        };
        Ok(Classification {
            suggested_name,
            confidence,
            usage: self.usage,
        })
    }

    async fn describe(&self, entity: &EntityProfile) -> Result<EntityDescription> {
        self.behave().await?;
        Ok(EntityDescription {
            description: format!("Manages {} records", entity.name),
            usage: self.usage,
        })
    }

    fn model_name(&self) -> &str {
        "mock-advisor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(key: u64, names: &[&str]) -> ClusterSummary {
        ClusterSummary {
            key: EntityId(key),
            entity_names: names.iter().map(|s| s.to_string()).collect(),
            descriptions: vec![],
            internal_weight: 0,
            external_weight: 0,
        }
    }

    #[tokio::test]
    async fn test_default_and_scripted_names() {
        let mock = MockBoundaryAdvisor::new().with_name(EntityId(3), "Catalog");
        let a = mock.classify(&summary(1, &["User", "Order"])).await.unwrap();
        let b = mock.classify(&summary(3, &["Product"])).await.unwrap();
        assert_eq!(a.suggested_name, "UserDomain");
        assert_eq!(b.suggested_name, "Catalog");
        assert_eq!(a.usage.total(), 50);
        assert_eq!(mock.calls(), 2);
        assert_eq!(mock.classified(), vec![vec!["User", "Order"], vec!["Product"]]);
    }

    #[tokio::test]
    async fn test_failing_mock_counts_calls() {
        let mock = MockBoundaryAdvisor::failing();
        assert!(mock.classify(&summary(1, &["User"])).await.is_err());
        assert_eq!(mock.calls(), 1);
    }
}
