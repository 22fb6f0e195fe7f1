//! Metered, time-bounded access to the optional advisor.
//!
//! Every consultation goes through [`AdvisorGate`]:
//! 1. no advisor configured → `Unavailable`
//! 2. accountant already exhausted → `BudgetExhausted` (no call issued)
//! 3. call with timeout; on error/timeout retry once, then `Unavailable`
//! 4. record usage; if the accountant rejects it → `BudgetExhausted`

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{
    BoundaryAdvisor, Classification, ClusterSummary, EntityDescription, EntityProfile, Metered,
};
use crate::accounting::TokenAccountant;
use crate::model::UnitId;

/// Attempts beyond the first before falling back.
const MAX_RETRIES: u32 = 1;

/// Outcome of one consultation.
#[derive(Debug, Clone, PartialEq)]
pub enum Consultation<T> {
    Answered(T),
    /// Advisor absent, failing or timing out; proceed on graph weights
    Unavailable(String),
    /// Token ceiling reached; stop issuing analysis requests
    BudgetExhausted,
}

impl<T> Consultation<T> {
    pub fn answered(self) -> Option<T> {
        match self {
            Self::Answered(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, Self::BudgetExhausted)
    }
}

/// Wraps an optional [`BoundaryAdvisor`] with timeout, retry and metering.
#[derive(Clone)]
pub struct AdvisorGate {
    advisor: Option<Arc<dyn BoundaryAdvisor>>,
    timeout: Duration,
}

impl AdvisorGate {
    pub fn new(advisor: Arc<dyn BoundaryAdvisor>, timeout: Duration) -> Self {
        Self {
            advisor: Some(advisor),
            timeout,
        }
    }

    /// A gate with no advisor behind it: every consultation is `Unavailable`.
    pub fn disabled() -> Self {
        Self {
            advisor: None,
            timeout: Duration::from_secs(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.advisor.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.advisor.as_deref().map(|a| a.model_name())
    }

    pub async fn classify(
        &self,
        unit: UnitId,
        cluster: &ClusterSummary,
        accountant: &TokenAccountant,
    ) -> Consultation<Classification> {
        let Some(advisor) = self.advisor.as_deref() else {
            return Consultation::Unavailable("advisor disabled".into());
        };
        self.consult(unit, accountant, || advisor.classify(cluster))
            .await
    }

    pub async fn describe(
        &self,
        unit: UnitId,
        entity: &EntityProfile,
        accountant: &TokenAccountant,
    ) -> Consultation<EntityDescription> {
        let Some(advisor) = self.advisor.as_deref() else {
            return Consultation::Unavailable("advisor disabled".into());
        };
        self.consult(unit, accountant, || advisor.describe(entity))
            .await
    }

    async fn consult<T, F, Fut>(
        &self,
        unit: UnitId,
        accountant: &TokenAccountant,
        call: F,
    ) -> Consultation<T>
    where
        T: Metered,
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if accountant.is_exhausted() {
            return Consultation::BudgetExhausted;
        }

        let mut last_error = String::new();
        for attempt in 0..=MAX_RETRIES {
            match tokio::time::timeout(self.timeout, call()).await {
                Ok(Ok(answer)) => {
                    let usage = answer.usage();
                    return match accountant.record(
                        unit.clone(),
                        usage.prompt_tokens,
                        usage.response_tokens,
                    ) {
                        Ok(()) => {
                            debug!(
                                unit = %unit,
                                tokens = usage.total(),
                                attempt,
                                "Advisor answered"
                            );
                            Consultation::Answered(answer)
                        }
                        Err(_) => Consultation::BudgetExhausted,
                    };
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("timed out after {:?}", self.timeout),
            }
            warn!(unit = %unit, attempt, error = %last_error, "Advisor call failed");
        }

        Consultation::Unavailable(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::MockBoundaryAdvisor;
    use crate::model::EntityId;

    fn summary() -> ClusterSummary {
        ClusterSummary {
            key: EntityId(1),
            entity_names: vec!["User".into()],
            descriptions: vec![],
            internal_weight: 0,
            external_weight: 0,
        }
    }

    #[tokio::test]
    async fn test_answer_is_metered() {
        let mock = Arc::new(MockBoundaryAdvisor::new().with_usage(30, 5));
        let gate = AdvisorGate::new(mock.clone(), Duration::from_secs(1));
        let acc = TokenAccountant::new(1_000);

        let outcome = gate.classify(UnitId::cluster(EntityId(1)), &summary(), &acc).await;
        assert_eq!(outcome.answered().unwrap().suggested_name, "UserDomain");
        assert_eq!(acc.used(), 35);
        assert_eq!(acc.records()[0].unit_id, UnitId::cluster(EntityId(1)));
    }

    #[tokio::test]
    async fn test_failure_retries_once_then_falls_back() {
        let mock = Arc::new(MockBoundaryAdvisor::failing());
        let gate = AdvisorGate::new(mock.clone(), Duration::from_secs(1));
        let acc = TokenAccountant::new(1_000);

        let outcome = gate.classify(UnitId::cluster(EntityId(1)), &summary(), &acc).await;
        assert!(matches!(outcome, Consultation::Unavailable(_)));
        assert_eq!(mock.calls(), 2);
        assert_eq!(acc.used(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let mock = Arc::new(MockBoundaryAdvisor::hanging());
        let gate = AdvisorGate::new(mock.clone(), Duration::from_millis(20));
        let acc = TokenAccountant::new(1_000);

        let outcome = gate.classify(UnitId::cluster(EntityId(1)), &summary(), &acc).await;
        match outcome {
            Consultation::Unavailable(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let mock = Arc::new(MockBoundaryAdvisor::new().with_usage(60, 0));
        let gate = AdvisorGate::new(mock.clone(), Duration::from_secs(1));
        let acc = TokenAccountant::new(100);

        let outcome = gate.classify(UnitId::cluster(EntityId(1)), &summary(), &acc).await;
        assert!(outcome.answered().is_some());
        // Second answer would push usage to 120.
        assert!(gate
            .classify(UnitId::cluster(EntityId(2)), &summary(), &acc)
            .await
            .is_budget_exhausted());
        // Exhausted: no further call is issued.
        assert!(gate
            .classify(UnitId::cluster(EntityId(3)), &summary(), &acc)
            .await
            .is_budget_exhausted());
        assert_eq!(mock.calls(), 2);
        assert_eq!(acc.used(), 60);
    }

    #[tokio::test]
    async fn test_disabled_gate() {
        let gate = AdvisorGate::disabled();
        let acc = TokenAccountant::new(100);
        assert!(!gate.is_enabled());
        assert!(matches!(
            gate.classify(UnitId::cluster(EntityId(1)), &summary(), &acc).await,
            Consultation::Unavailable(_)
        ));
    }
}
