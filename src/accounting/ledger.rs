//! Token/Cost Accountant.
//!
//! One [`TokenAccountant`] instance is scoped to one analysis run and passed
//! by reference to every analysis unit. All mutation goes through a single
//! `parking_lot::Mutex`, so the budget check and the insert of a record are
//! one atomic step: concurrent workers can never jointly exceed the ceiling.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{DecompositionError, DecompositionResult};
use crate::model::{EntityId, ServiceId, UnitId};

/// One metered analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsageRecord {
    pub unit_id: UnitId,
    pub prompt_tokens: u64,
    pub response_tokens: u64,
    /// `None` until the unit is attributed to a service of the plan
    pub attributed_service_id: Option<ServiceId>,
}

impl TokenUsageRecord {
    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.response_tokens)
    }
}

/// Prompt/response/request counters. Saturating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStats {
    pub prompt_tokens: u64,
    pub response_tokens: u64,
    pub requests: u64,
}

impl TokenStats {
    fn add(&mut self, record: &TokenUsageRecord) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(record.prompt_tokens);
        self.response_tokens = self.response_tokens.saturating_add(record.response_tokens);
        self.requests = self.requests.saturating_add(1);
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.response_tokens)
    }
}

/// Token usage attributed to one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTokenStats {
    pub service_id: ServiceId,
    #[serde(flatten)]
    pub stats: TokenStats,
}

/// Token usage of one analysis unit (file, entity or cluster).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTokenStats {
    pub unit_id: UnitId,
    pub total_tokens: u64,
    #[serde(flatten)]
    pub stats: TokenStats,
}

/// Read-only aggregate of a run's token usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsageSummary {
    pub total_tokens: u64,
    pub total_prompt_tokens: u64,
    pub total_response_tokens: u64,
    pub total_requests: u64,
    pub average_prompt_tokens_per_request: f64,
    pub average_response_tokens_per_request: f64,
    /// Per-service breakdown, ordered by service id
    pub microservice_stats: Vec<ServiceTokenStats>,
    /// Usage not (yet) attributed to any service
    pub unattributed: TokenStats,
    /// Sorted by total tokens descending, then unit id ascending
    pub top_consuming_files: Vec<UnitTokenStats>,
    pub max_total_tokens: u64,
    pub remaining: u64,
    pub exhausted: bool,
    /// Tokens of requests rejected after the ceiling was reached
    pub rejected_tokens: u64,
}

impl TokenUsageSummary {
    /// Summary of a run that never recorded anything.
    pub fn empty(max_total_tokens: u64) -> Self {
        TokenAccountant::new(max_total_tokens).summarize(0)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    records: Vec<TokenUsageRecord>,
    /// Explicit unit → entity anchors (file units)
    anchors: BTreeMap<UnitId, EntityId>,
    attributions: BTreeMap<UnitId, ServiceId>,
    used: u64,
    rejected_tokens: u64,
    exhausted: bool,
}

/// Process-wide token ledger for one analysis run.
#[derive(Debug)]
pub struct TokenAccountant {
    max_total_tokens: u64,
    state: Mutex<LedgerState>,
}

impl TokenAccountant {
    pub fn new(max_total_tokens: u64) -> Self {
        Self {
            max_total_tokens,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn max_total_tokens(&self) -> u64 {
        self.max_total_tokens
    }

    /// Record one analysis request.
    ///
    /// Fails with `BudgetExceeded` when the request would push cumulative
    /// usage past the ceiling; the rejected request is not stored and the
    /// accountant stays exhausted until [`reset`](Self::reset). Counts whose
    /// sum does not fit in a `u64` are rejected the same way.
    pub fn record(
        &self,
        unit_id: UnitId,
        prompt_tokens: u64,
        response_tokens: u64,
    ) -> DecompositionResult<()> {
        let sum = prompt_tokens.checked_add(response_tokens);
        let requested = sum.unwrap_or(u64::MAX);
        let mut state = self.state.lock();

        let next = sum.and_then(|n| state.used.checked_add(n));
        let fits = next.is_some_and(|total| total <= self.max_total_tokens);
        if state.exhausted || !fits {
            state.exhausted = true;
            state.rejected_tokens = state.rejected_tokens.saturating_add(requested);
            warn!(
                unit = %unit_id,
                requested,
                used = state.used,
                ceiling = self.max_total_tokens,
                "Token budget exceeded, request rejected"
            );
            return Err(DecompositionError::BudgetExceeded {
                unit_id,
                requested,
                used: state.used,
                ceiling: self.max_total_tokens,
            });
        }

        state.used += requested;
        debug!(
            unit = %unit_id,
            prompt_tokens,
            response_tokens,
            used = state.used,
            "Token usage recorded"
        );
        state.records.push(TokenUsageRecord {
            unit_id,
            prompt_tokens,
            response_tokens,
            attributed_service_id: None,
        });
        Ok(())
    }

    pub fn remaining_budget(&self) -> u64 {
        self.max_total_tokens.saturating_sub(self.state.lock().used)
    }

    pub fn used(&self) -> u64 {
        self.state.lock().used
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.lock().exhausted
    }

    /// Tie a unit (typically a `file:` unit) to the entity it analyzed.
    pub fn anchor(&self, unit_id: UnitId, entity: EntityId) {
        self.state.lock().anchors.insert(unit_id, entity);
    }

    pub fn attribute(&self, unit_id: UnitId, service: ServiceId) {
        self.state.lock().attributions.insert(unit_id, service);
    }

    /// Attribute every recorded unit whose anchor entity `locate` can place.
    ///
    /// Anchors come from [`anchor`](Self::anchor) or, failing that, from the
    /// unit id itself ([`UnitId::anchor_entity`]). Previous attributions are
    /// replaced.
    pub fn attribute_entities(&self, locate: impl Fn(EntityId) -> Option<ServiceId>) {
        let mut state = self.state.lock();
        let mut attributions = BTreeMap::new();
        for record in &state.records {
            let anchor = state
                .anchors
                .get(&record.unit_id)
                .copied()
                .or_else(|| record.unit_id.anchor_entity());
            if let Some(service) = anchor.and_then(&locate) {
                attributions.insert(record.unit_id.clone(), service);
            }
        }
        state.attributions = attributions;
    }

    /// Snapshot of the stored records with their current attribution.
    pub fn records(&self) -> Vec<TokenUsageRecord> {
        attributed_records(&self.state.lock())
    }

    /// Start a new run: drop all records, anchors and the exhausted flag.
    pub fn reset(&self) {
        *self.state.lock() = LedgerState::default();
        debug!(ceiling = self.max_total_tokens, "Token accountant reset");
    }

    /// Aggregate usage; `top_n` bounds `top_consuming_files` (0 = all).
    pub fn summarize(&self, top_n: usize) -> TokenUsageSummary {
        // One guard: totals and budget status come from the same state.
        let state = self.state.lock();
        let records = attributed_records(&state);

        let mut totals = TokenStats::default();
        let mut per_service: BTreeMap<ServiceId, TokenStats> = BTreeMap::new();
        let mut per_unit: BTreeMap<UnitId, TokenStats> = BTreeMap::new();
        let mut unattributed = TokenStats::default();

        for record in &records {
            totals.add(record);
            match record.attributed_service_id {
                Some(service) => per_service.entry(service).or_default().add(record),
                None => unattributed.add(record),
            }
            per_unit.entry(record.unit_id.clone()).or_default().add(record);
        }

        let mut top: Vec<UnitTokenStats> = per_unit
            .into_iter()
            .map(|(unit_id, stats)| UnitTokenStats {
                unit_id,
                total_tokens: stats.total_tokens(),
                stats,
            })
            .collect();
        // BTreeMap order is unit_id ascending; a stable sort keeps it on ties.
        top.sort_by(|a, b| b.total_tokens.cmp(&a.total_tokens));
        if top_n > 0 {
            top.truncate(top_n);
        }

        let average = |sum: u64| {
            if totals.requests == 0 {
                0.0
            } else {
                sum as f64 / totals.requests as f64
            }
        };

        TokenUsageSummary {
            total_tokens: totals.total_tokens(),
            total_prompt_tokens: totals.prompt_tokens,
            total_response_tokens: totals.response_tokens,
            total_requests: totals.requests,
            average_prompt_tokens_per_request: average(totals.prompt_tokens),
            average_response_tokens_per_request: average(totals.response_tokens),
            microservice_stats: per_service
                .into_iter()
                .map(|(service_id, stats)| ServiceTokenStats { service_id, stats })
                .collect(),
            unattributed,
            top_consuming_files: top,
            max_total_tokens: self.max_total_tokens,
            remaining: self.max_total_tokens.saturating_sub(state.used),
            exhausted: state.exhausted,
            rejected_tokens: state.rejected_tokens,
        }
    }
}

fn attributed_records(state: &LedgerState) -> Vec<TokenUsageRecord> {
    state
        .records
        .iter()
        .map(|r| TokenUsageRecord {
            attributed_service_id: state.attributions.get(&r.unit_id).copied(),
            ..r.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_and_remaining_budget() {
        let acc = TokenAccountant::new(100);
        acc.record(UnitId::file("a.cs"), 30, 10).unwrap();
        assert_eq!(acc.remaining_budget(), 60);
        assert_eq!(acc.used(), 40);
        assert!(!acc.is_exhausted());
    }

    #[test]
    fn test_record_rejects_triggering_call() {
        let acc = TokenAccountant::new(100);
        acc.record(UnitId::file("a.cs"), 50, 40).unwrap();
        let err = acc.record(UnitId::file("b.cs"), 10, 5).unwrap_err();
        assert!(matches!(
            err,
            DecompositionError::BudgetExceeded { requested: 15, used: 90, ceiling: 100, .. }
        ));
        assert!(acc.is_exhausted());
        assert_eq!(acc.used(), 90);
        assert_eq!(acc.records().len(), 1);

        // Exhaustion is sticky even for requests that would fit.
        assert!(acc.record(UnitId::file("c.cs"), 1, 1).is_err());
        let summary = acc.summarize(0);
        assert_eq!(summary.rejected_tokens, 17);
        assert!(summary.exhausted);
        assert_eq!(summary.remaining, 10);
    }

    #[test]
    fn test_exact_ceiling_is_accepted() {
        let acc = TokenAccountant::new(10);
        acc.record(UnitId::file("a.cs"), 6, 4).unwrap();
        assert_eq!(acc.remaining_budget(), 0);
        assert!(!acc.is_exhausted());
    }

    #[test]
    fn test_reset_clears_state() {
        let acc = TokenAccountant::new(10);
        acc.record(UnitId::file("a.cs"), 6, 4).unwrap();
        let _ = acc.record(UnitId::file("b.cs"), 1, 0);
        acc.reset();
        assert_eq!(acc.remaining_budget(), 10);
        assert!(!acc.is_exhausted());
        assert!(acc.records().is_empty());
        assert_eq!(acc.summarize(0).rejected_tokens, 0);
    }

    #[test]
    fn test_summary_top_files_tie_break_by_unit_id() {
        let acc = TokenAccountant::new(10_000);
        acc.record(UnitId::file("b.cs"), 50, 50).unwrap();
        acc.record(UnitId::file("a.cs"), 60, 40).unwrap();
        acc.record(UnitId::file("c.cs"), 300, 0).unwrap();
        acc.record(UnitId::file("d.cs"), 1, 0).unwrap();

        let summary = acc.summarize(3);
        let order: Vec<&str> = summary
            .top_consuming_files
            .iter()
            .map(|u| u.unit_id.as_str())
            .collect();
        assert_eq!(order, vec!["file:c.cs", "file:a.cs", "file:b.cs"]);
        assert_eq!(summary.total_tokens, 501);
        assert_eq!(summary.total_requests, 4);
        assert_eq!(summary.total_prompt_tokens, 411);
        assert!((summary.average_response_tokens_per_request - 22.5).abs() < 1e-9);
    }

    #[test]
    fn test_attribution_by_anchor() {
        let acc = TokenAccountant::new(10_000);
        acc.record(UnitId::entity(EntityId(1)), 10, 5).unwrap();
        acc.record(UnitId::file("Models/Order.cs"), 20, 5).unwrap();
        acc.record(UnitId::cluster(EntityId(3)), 7, 3).unwrap();
        acc.record(UnitId::file("Unknown.cs"), 1, 1).unwrap();
        acc.anchor(UnitId::file("Models/Order.cs"), EntityId(2));

        acc.attribute_entities(|e| match e.0 {
            1 | 2 => Some(ServiceId(1)),
            3 => Some(ServiceId(2)),
            _ => None,
        });

        let summary = acc.summarize(0);
        assert_eq!(summary.microservice_stats.len(), 2);
        assert_eq!(summary.microservice_stats[0].service_id, ServiceId(1));
        assert_eq!(summary.microservice_stats[0].stats.requests, 2);
        assert_eq!(summary.microservice_stats[0].stats.total_tokens(), 40);
        assert_eq!(summary.microservice_stats[1].stats.total_tokens(), 10);
        assert_eq!(summary.unattributed.requests, 1);

        let records = acc.records();
        assert_eq!(records[0].attributed_service_id, Some(ServiceId(1)));
        assert_eq!(records[3].attributed_service_id, None);
    }

    #[test]
    fn test_concurrent_records_never_exceed_ceiling() {
        let acc = Arc::new(TokenAccountant::new(500));
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let acc = Arc::clone(&acc);
                scope.spawn(move || {
                    for i in 0..10 {
                        let _ = acc.record(UnitId::file(&format!("w{}/f{}.cs", worker, i)), 7, 3);
                    }
                });
            }
        });
        assert_eq!(acc.used(), 500);
        assert_eq!(acc.records().len(), 50);
        assert_eq!(acc.summarize(0).rejected_tokens, 300);
    }

    #[test]
    fn test_overflowing_usage_is_rejected() {
        let acc = TokenAccountant::new(u64::MAX);
        acc.record(UnitId::file("a.cs"), 10, 0).unwrap();

        let err = acc.record(UnitId::file("x.cs"), u64::MAX, 2).unwrap_err();
        assert!(matches!(
            err,
            DecompositionError::BudgetExceeded { requested: u64::MAX, used: 10, .. }
        ));
        // Fits on its own, but not on top of what is already used.
        let acc = TokenAccountant::new(u64::MAX);
        acc.record(UnitId::file("a.cs"), 10, 0).unwrap();
        assert!(acc.record(UnitId::file("y.cs"), u64::MAX - 5, 0).is_err());

        let summary = acc.summarize(0);
        assert_eq!(summary.total_tokens, 10);
        assert_eq!(summary.rejected_tokens, u64::MAX - 5);
        assert!(summary.exhausted);
    }

    #[test]
    fn test_saturating_stats() {
        let record = TokenUsageRecord {
            unit_id: UnitId::file("a.cs"),
            prompt_tokens: u64::MAX,
            response_tokens: 1,
            attributed_service_id: None,
        };
        let mut stats = TokenStats::default();
        stats.add(&record);
        stats.add(&record);
        assert_eq!(record.total(), u64::MAX);
        assert_eq!(stats.prompt_tokens, u64::MAX);
        assert_eq!(stats.total_tokens(), u64::MAX);
        assert_eq!(stats.requests, 2);
    }

    #[test]
    fn test_summary_consistent_under_concurrent_records() {
        let acc = Arc::new(TokenAccountant::new(1_000_000));
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let acc = Arc::clone(&acc);
                scope.spawn(move || {
                    for i in 0..200 {
                        let _ = acc.record(UnitId::file(&format!("w{}/f{}.cs", worker, i)), 3, 2);
                    }
                });
            }
            let acc = Arc::clone(&acc);
            scope.spawn(move || {
                for _ in 0..200 {
                    let summary = acc.summarize(1);
                    assert_eq!(
                        summary.total_tokens + summary.remaining,
                        summary.max_total_tokens
                    );
                    assert_eq!(summary.total_tokens, summary.total_requests * 5);
                }
            });
        });
        assert_eq!(acc.used(), 4_000);
    }

    #[test]
    fn test_empty_summary() {
        let summary = TokenUsageSummary::empty(1_000);
        assert_eq!(summary.total_tokens, 0);
        assert_eq!(summary.average_prompt_tokens_per_request, 0.0);
        assert_eq!(summary.remaining, 1_000);
        assert!(summary.top_consuming_files.is_empty());
    }
}
