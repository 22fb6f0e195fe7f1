//! Boundary Resolver.
//!
//! Clusters entities into candidate services:
//!
//! 1. start with one cluster per entity
//! 2. repeatedly merge the best-scoring pair from the [`ClusteringStrategy`]
//!    until `max_services` is reached or the best score drops below the
//!    coupling threshold; optionally let the advisor veto merges
//! 3. enforce `max_services` as a hard bound and `min_entities_per_service`
//! 4. name clusters (advisor, else the most coupled member)
//! 5. assemble a version-1 [`DecompositionPlan`] with services ordered by
//!    their smallest member id
//!
//! With the advisor disabled the result is a pure function of the graph
//! and the constraints. The merge loop itself is single-threaded; only
//! advisor consultations run concurrently.

pub mod state;
pub mod strategy;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::accounting::TokenAccountant;
use crate::advisor::{AdvisorGate, Classification, ClusterSummary, Consultation};
use crate::error::{DecompositionError, DecompositionResult};
use crate::graph::{most_coupled_member, DependencyGraph};
use crate::model::{EntityId, UnitId};
use crate::plan::{service_name_key, DecompositionPlan};
use crate::{AdvisorConfig, BudgetConfig};

pub use state::ClusterState;
pub use strategy::{rank, ClusteringStrategy, GreedyAgglomeration, MergeCandidate};

/// Size and coupling constraints for one resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveConstraints {
    /// Hard upper bound on the number of services
    pub max_services: Option<usize>,
    pub min_entities_per_service: usize,
    /// Soft target; exceeding it is reported, not enforced
    pub max_cross_service_edge_weight: Option<u64>,
    /// Merges scoring below this are not taken
    pub coupling_threshold: f64,
}

impl Default for ResolveConstraints {
    fn default() -> Self {
        Self {
            max_services: None,
            min_entities_per_service: 1,
            max_cross_service_edge_weight: None,
            coupling_threshold: 1.0,
        }
    }
}

impl From<&BudgetConfig> for ResolveConstraints {
    fn from(budget: &BudgetConfig) -> Self {
        Self {
            max_services: budget.max_services,
            min_entities_per_service: budget.min_entities_per_service,
            max_cross_service_edge_weight: budget.max_cross_service_edge_weight,
            coupling_threshold: budget.coupling_threshold,
        }
    }
}

/// How advisor answers are used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorPolicy {
    /// Answers below this confidence veto a merge / are ignored for naming
    pub min_confidence: f64,
    /// Consult the advisor before each merge, not only for final naming
    pub validate_merges: bool,
    /// Concurrent consultations
    pub parallelism: usize,
}

impl Default for AdvisorPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            validate_merges: false,
            parallelism: 4,
        }
    }
}

impl From<&AdvisorConfig> for AdvisorPolicy {
    fn from(config: &AdvisorConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            validate_merges: config.validate_merges,
            parallelism: config.parallelism.max(1),
        }
    }
}

/// One merge taken by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeStep {
    pub left: EntityId,
    pub right: EntityId,
    pub score: f64,
    /// Approved by an advisor answer (not a fallback)
    pub advisor_approved: bool,
    /// Taken to satisfy `max_services` / `min_entities_per_service`
    pub forced: bool,
}

/// Output of [`BoundaryResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub plan: DecompositionPlan,
    pub cross_service_weight: u64,
    pub exceeds_soft_target: bool,
    pub merges: Vec<MergeStep>,
    pub advisor_calls: usize,
    pub strategy: String,
}

enum Validation {
    /// `vetoed` holds the better-ranked pairs the advisor rejected first
    Accept {
        candidate: MergeCandidate,
        name: Option<String>,
        vetoed: Vec<(EntityId, EntityId)>,
    },
    AllVetoed(Vec<(EntityId, EntityId)>),
}

type Pair = (EntityId, EntityId);

pub struct BoundaryResolver {
    strategy: Box<dyn ClusteringStrategy>,
    gate: AdvisorGate,
    policy: AdvisorPolicy,
    descriptions: BTreeMap<EntityId, String>,
}

impl Default for BoundaryResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable bookkeeping of one `resolve` call.
struct Run {
    advisor_active: bool,
    truncated: bool,
    advisor_calls: usize,
    /// Merge answers keyed by pair, valid while the merged membership
    /// still matches the snapshot taken when asking
    answers: BTreeMap<Pair, (BTreeSet<EntityId>, Classification)>,
}

impl Run {
    fn answer(&self, state: &ClusterState, candidate: &MergeCandidate) -> Option<&Classification> {
        let (snapshot, answer) = self.answers.get(&(candidate.left, candidate.right))?;
        (*snapshot == merged_members(state, candidate)).then_some(answer)
    }
}

impl BoundaryResolver {
    /// Greedy sum-linkage strategy, no advisor.
    pub fn new() -> Self {
        Self {
            strategy: Box::new(GreedyAgglomeration),
            gate: AdvisorGate::disabled(),
            policy: AdvisorPolicy::default(),
            descriptions: BTreeMap::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn ClusteringStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_advisor(mut self, gate: AdvisorGate, policy: AdvisorPolicy) -> Self {
        self.gate = gate;
        self.policy = policy;
        self
    }

    /// Entity descriptions from the profiling phase, shown to the advisor.
    pub fn with_descriptions(mut self, descriptions: BTreeMap<EntityId, String>) -> Self {
        self.descriptions = descriptions;
        self
    }

    pub async fn resolve(
        &self,
        graph: &DependencyGraph,
        accountant: &TokenAccountant,
        constraints: &ResolveConstraints,
    ) -> DecompositionResult<Resolution> {
        if graph.is_empty() {
            return Err(DecompositionError::EmptyEntitySet);
        }

        let mut run = Run {
            advisor_active: self.gate.is_enabled() && !accountant.is_exhausted(),
            truncated: accountant.is_exhausted(),
            advisor_calls: 0,
            answers: BTreeMap::new(),
        };
        let mut state = ClusterState::singletons(graph);
        let mut merges: Vec<MergeStep> = Vec::new();
        let mut vetoed: BTreeSet<(EntityId, EntityId)> = BTreeSet::new();
        let mut validated_names: BTreeMap<EntityId, (BTreeSet<EntityId>, String)> = BTreeMap::new();

        info!(
            entities = graph.node_count(),
            strategy = self.strategy.name(),
            advisor = run.advisor_active,
            "Resolving service boundaries"
        );

        // Phase 1: greedy agglomeration
        loop {
            if let Some(max) = constraints.max_services {
                if state.len() <= max.max(1) {
                    break;
                }
            }
            let ranked: Vec<MergeCandidate> = rank(self.strategy.propose(graph, &state))
                .into_iter()
                .filter(|c| {
                    c.score > 0.0
                        && c.score >= constraints.coupling_threshold
                        && !vetoed.contains(&(c.left, c.right))
                })
                .collect();
            let Some(best) = ranked.first().cloned() else {
                break;
            };

            let (candidate, name) = if run.advisor_active && self.policy.validate_merges {
                match self
                    .validate(graph, &state, &ranked, accountant, &mut run)
                    .await
                {
                    Validation::Accept {
                        candidate,
                        name,
                        vetoed: rejected,
                    } => {
                        vetoed.extend(rejected);
                        (candidate, name)
                    }
                    Validation::AllVetoed(pairs) => {
                        vetoed.extend(pairs);
                        continue;
                    }
                }
            } else {
                (best, None)
            };

            let approved = name.is_some();
            let Some(key) = state.merge(candidate.left, candidate.right) else {
                break;
            };
            let touches = |(a, b): &Pair| {
                [candidate.left, candidate.right].contains(a)
                    || [candidate.left, candidate.right].contains(b)
            };
            vetoed.retain(|pair| !touches(pair));
            run.answers.retain(|pair, _| !touches(pair));
            if let (Some(name), Some(members)) = (name, state.members(key)) {
                validated_names.insert(key, (members.clone(), name));
            }
            debug!(
                left = %candidate.left,
                right = %candidate.right,
                score = candidate.score,
                clusters = state.len(),
                "Clusters merged"
            );
            merges.push(MergeStep {
                left: candidate.left,
                right: candidate.right,
                score: candidate.score,
                advisor_approved: approved,
                forced: false,
            });
        }

        // Phase 2: hard bounds
        if let Some(max) = constraints.max_services {
            while state.len() > max.max(1) {
                let Some(step) = forced_merge(&mut state) else {
                    break;
                };
                merges.push(step);
            }
        }
        let unassigned =
            enforce_min_size(&mut state, constraints.min_entities_per_service, &mut merges);

        // Phase 3: naming
        let names = self
            .name_clusters(graph, &state, &validated_names, accountant, &mut run)
            .await;

        let groups: Vec<(String, BTreeSet<EntityId>)> = state
            .clusters()
            .iter()
            .map(|(key, members)| {
                let name = names.get(key).cloned().unwrap_or_else(|| key.to_string());
                (name, members.clone())
            })
            .collect();
        let plan =
            DecompositionPlan::assemble(graph, dedupe_names(groups), unassigned, run.truncated);

        let assignments = plan.assignments();
        accountant.attribute_entities(|e| assignments.get(&e).copied());

        let cross_service_weight = plan.cross_service_weight(graph);
        let exceeds_soft_target = constraints
            .max_cross_service_edge_weight
            .is_some_and(|limit| cross_service_weight > limit);
        if exceeds_soft_target {
            warn!(
                cross_service_weight,
                limit = ?constraints.max_cross_service_edge_weight,
                "Cross-service coupling above soft target"
            );
        }

        info!(
            services = plan.services.len(),
            unassigned = plan.unassigned_entities.len(),
            merges = merges.len(),
            cross_service_weight,
            budget_truncated = plan.budget_truncated,
            "Service boundaries resolved"
        );

        Ok(Resolution {
            plan,
            cross_service_weight,
            exceeds_soft_target,
            merges,
            advisor_calls: run.advisor_calls,
            strategy: self.strategy.name().to_string(),
        })
    }

    /// Walk `ranked` best first and take the first candidate the advisor
    /// does not veto.
    ///
    /// Unanswered candidates are asked in windows of up to `parallelism`
    /// pairwise-disjoint pairs. Answers stay cached in `run` until one of
    /// the two clusters changes, so no pair is asked twice.
    async fn validate(
        &self,
        graph: &DependencyGraph,
        state: &ClusterState,
        ranked: &[MergeCandidate],
        accountant: &TokenAccountant,
        run: &mut Run,
    ) -> Validation {
        let mut vetoed: Vec<Pair> = Vec::new();
        let mut absent: BTreeSet<Pair> = BTreeSet::new();

        loop {
            let mut unanswered = None;
            for (pos, candidate) in ranked.iter().enumerate() {
                let pair = (candidate.left, candidate.right);
                if vetoed.contains(&pair) {
                    continue;
                }
                // Absent advisor: proceed on graph weight alone.
                if absent.contains(&pair) {
                    return Validation::Accept {
                        candidate: candidate.clone(),
                        name: None,
                        vetoed,
                    };
                }
                match run.answer(state, candidate) {
                    Some(answer) if answer.confidence >= self.policy.min_confidence => {
                        return Validation::Accept {
                            candidate: candidate.clone(),
                            name: Some(answer.suggested_name.clone()),
                            vetoed,
                        };
                    }
                    Some(answer) => {
                        debug!(
                            left = %candidate.left,
                            right = %candidate.right,
                            confidence = answer.confidence,
                            "Advisor vetoed merge"
                        );
                        vetoed.push(pair);
                    }
                    None => {
                        unanswered = Some(pos);
                        break;
                    }
                }
            }

            let Some(first) = unanswered else {
                return Validation::AllVetoed(vetoed);
            };
            if !run.advisor_active {
                return Validation::Accept {
                    candidate: ranked[first].clone(),
                    name: None,
                    vetoed,
                };
            }

            let mut window: Vec<MergeCandidate> = Vec::new();
            let mut busy: BTreeSet<EntityId> = BTreeSet::new();
            for candidate in &ranked[first..] {
                if window.len() >= self.policy.parallelism.max(1) {
                    break;
                }
                if busy.contains(&candidate.left)
                    || busy.contains(&candidate.right)
                    || absent.contains(&(candidate.left, candidate.right))
                    || run.answer(state, candidate).is_some()
                {
                    continue;
                }
                busy.extend([candidate.left, candidate.right]);
                window.push(candidate.clone());
            }

            let requests: Vec<(usize, UnitId, ClusterSummary)> = window
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let members = merged_members(state, c);
                    (
                        i,
                        UnitId::merge(c.left, c.right),
                        self.summarize(graph, c.left, &members),
                    )
                })
                .collect();

            for (i, outcome) in self.consult_all(requests, accountant, run).await {
                let candidate = &window[i];
                let pair = (candidate.left, candidate.right);
                match outcome {
                    Consultation::Answered(answer) => {
                        run.answers
                            .insert(pair, (merged_members(state, candidate), answer));
                    }
                    Consultation::Unavailable(_) | Consultation::BudgetExhausted => {
                        absent.insert(pair);
                    }
                }
            }
        }
    }

    async fn name_clusters(
        &self,
        graph: &DependencyGraph,
        state: &ClusterState,
        validated: &BTreeMap<EntityId, (BTreeSet<EntityId>, String)>,
        accountant: &TokenAccountant,
        run: &mut Run,
    ) -> BTreeMap<EntityId, String> {
        let mut names = BTreeMap::new();
        let mut requests = Vec::new();

        for (idx, (key, members)) in state.clusters().iter().enumerate() {
            match validated.get(key) {
                Some((snapshot, name)) if snapshot == members => {
                    names.insert(*key, name.clone());
                }
                _ if run.advisor_active => {
                    let summary = self.summarize(graph, *key, members);
                    requests.push((idx, UnitId::cluster(*key), summary));
                }
                _ => {}
            }
        }

        let keys: Vec<EntityId> = state.clusters().keys().copied().collect();
        for (idx, outcome) in self.consult_all(requests, accountant, run).await {
            if let Consultation::Answered(c) = outcome {
                if c.confidence >= self.policy.min_confidence {
                    names.insert(keys[idx], c.suggested_name);
                }
            }
        }

        for (key, members) in state.clusters() {
            if names.contains_key(key) {
                continue;
            }
            let fallback = most_coupled_member(graph, members.iter().copied())
                .and_then(|id| graph.entity(id))
                .map(|e| e.name.clone())
                .unwrap_or_else(|| key.to_string());
            names.insert(*key, fallback);
        }
        names
    }

    /// Bounded-concurrency consultations, reconciled back into request order.
    async fn consult_all(
        &self,
        requests: Vec<(usize, UnitId, ClusterSummary)>,
        accountant: &TokenAccountant,
        run: &mut Run,
    ) -> Vec<(usize, Consultation<Classification>)> {
        if requests.is_empty() {
            return Vec::new();
        }
        let gate = &self.gate;
        let mut outcomes: Vec<(usize, Consultation<Classification>)> = stream::iter(requests)
            .map(|(idx, unit, summary)| async move {
                let outcome = gate.classify(unit, &summary, accountant).await;
                (idx, outcome)
            })
            .buffer_unordered(self.policy.parallelism.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(idx, _)| *idx);

        for (_, outcome) in &outcomes {
            match outcome {
                Consultation::BudgetExhausted => {
                    if run.advisor_active {
                        warn!("Token budget exhausted; continuing on graph weights only");
                    }
                    run.advisor_active = false;
                    run.truncated = true;
                }
                _ => run.advisor_calls += 1,
            }
        }
        outcomes
    }

    fn summarize(
        &self,
        graph: &DependencyGraph,
        key: EntityId,
        members: &BTreeSet<EntityId>,
    ) -> ClusterSummary {
        let mut internal_weight = 0;
        let mut external_weight = 0;
        for (a, b, w) in graph.weighted_edges() {
            match (members.contains(&a), members.contains(&b)) {
                (true, true) => internal_weight += w,
                (true, false) | (false, true) => external_weight += w,
                _ => {}
            }
        }
        ClusterSummary {
            key,
            entity_names: members
                .iter()
                .filter_map(|id| graph.entity(*id).map(|e| e.name.clone()))
                .collect(),
            descriptions: members
                .iter()
                .map(|id| self.descriptions.get(id).cloned().unwrap_or_default())
                .collect(),
            internal_weight,
            external_weight,
        }
    }
}

/// Members of the cluster that merging `candidate` would produce.
fn merged_members(state: &ClusterState, candidate: &MergeCandidate) -> BTreeSet<EntityId> {
    [candidate.left, candidate.right]
        .into_iter()
        .filter_map(|key| state.members(key))
        .flatten()
        .copied()
        .collect()
}

/// Merge the best-linked pair regardless of threshold, or, with no links
/// left, the two smallest clusters.
fn forced_merge(state: &mut ClusterState) -> Option<MergeStep> {
    let (left, right, score) = match state.links().iter().next() {
        Some(_) => {
            let best = rank(
                state
                    .links()
                    .iter()
                    .map(|((a, b), w)| MergeCandidate {
                        left: *a,
                        right: *b,
                        score: *w as f64,
                    })
                    .collect(),
            )
            .into_iter()
            .next()?;
            (best.left, best.right, best.score)
        }
        None => {
            let mut by_size: Vec<(usize, EntityId)> = state
                .clusters()
                .iter()
                .map(|(k, m)| (m.len(), *k))
                .collect();
            by_size.sort();
            let (_, a) = by_size.first().copied()?;
            let (_, b) = by_size.get(1).copied()?;
            (a.min(b), a.max(b), 0.0)
        }
    };
    state.merge(left, right)?;
    debug!(left = %left, right = %right, score, "Forced merge to honour max_services");
    Some(MergeStep {
        left,
        right,
        score,
        advisor_approved: false,
        forced: true,
    })
}

/// Fold undersized clusters into their most coupled neighbour; clusters
/// with no neighbour are dissolved into the unassigned set.
fn enforce_min_size(
    state: &mut ClusterState,
    min: usize,
    merges: &mut Vec<MergeStep>,
) -> BTreeSet<EntityId> {
    let min = min.max(1);
    let mut unassigned = BTreeSet::new();
    loop {
        let Some(key) = state
            .clusters()
            .iter()
            .find(|(_, members)| members.len() < min)
            .map(|(k, _)| *k)
        else {
            break;
        };
        let partner = state
            .neighbors(key)
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)));
        match partner {
            Some((other, weight)) => {
                state.merge(key, other);
                merges.push(MergeStep {
                    left: key.min(other),
                    right: key.max(other),
                    score: weight as f64,
                    advisor_approved: false,
                    forced: true,
                });
            }
            None => {
                if let Some(members) = state.remove(key) {
                    warn!(
                        cluster = %key,
                        size = members.len(),
                        min,
                        "Undersized isolated cluster left unassigned"
                    );
                    unassigned.extend(members);
                }
            }
        }
    }
    unassigned
}

/// Make names unique under [`service_name_key`] by suffixing 2, 3, ...
fn dedupe_names(groups: Vec<(String, BTreeSet<EntityId>)>) -> Vec<(String, BTreeSet<EntityId>)> {
    let mut used: BTreeSet<String> = BTreeSet::new();
    groups
        .into_iter()
        .map(|(name, members)| {
            let mut candidate = name.clone();
            let mut n = 2;
            while !used.insert(service_name_key(&candidate)) {
                candidate = format!("{}{}", name, n);
                n += 1;
            }
            (candidate, members)
        })
        .collect()
}
