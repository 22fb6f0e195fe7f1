//! Pluggable clustering strategies.
//!
//! A strategy only scores candidate merges; the resolver owns the loop,
//! thresholds, advisor validation and tie-breaking.

use serde::{Deserialize, Serialize};

use super::state::ClusterState;
use crate::graph::DependencyGraph;
use crate::model::EntityId;

/// A scored proposal to merge clusters `left < right`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeCandidate {
    pub left: EntityId,
    pub right: EntityId,
    pub score: f64,
}

pub trait ClusteringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score every merge worth considering. Order does not matter.
    fn propose(&self, graph: &DependencyGraph, state: &ClusterState) -> Vec<MergeCandidate>;
}

/// Weighted hierarchical agglomeration, sum linkage: the score of a pair
/// is the total weight of the edges between the two clusters.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyAgglomeration;

impl ClusteringStrategy for GreedyAgglomeration {
    fn name(&self) -> &'static str {
        "greedy_sum_linkage"
    }

    fn propose(&self, _graph: &DependencyGraph, state: &ClusterState) -> Vec<MergeCandidate> {
        state
            .links()
            .iter()
            .map(|((left, right), weight)| MergeCandidate {
                left: *left,
                right: *right,
                score: *weight as f64,
            })
            .collect()
    }
}

/// Best first: score descending, then `(left, right)` ascending.
pub fn rank(mut candidates: Vec<MergeCandidate>) -> Vec<MergeCandidate> {
    for c in candidates.iter_mut() {
        if c.left > c.right {
            std::mem::swap(&mut c.left, &mut c.right);
        }
    }
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.left.cmp(&b.left))
            .then(a.right.cmp(&b.right))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::shop_graph;

    #[test]
    fn test_greedy_ties_break_on_lowest_ids() {
        let graph = shop_graph();
        let state = ClusterState::singletons(&graph);
        let ranked = rank(GreedyAgglomeration.propose(&graph, &state));
        assert_eq!(ranked.len(), 2);
        assert_eq!((ranked[0].left, ranked[0].right), (EntityId(1), EntityId(2)));
        assert_eq!((ranked[1].left, ranked[1].right), (EntityId(2), EntityId(3)));
    }

    #[test]
    fn test_rank_normalizes_pair_order() {
        let ranked = rank(vec![
            MergeCandidate { left: EntityId(5), right: EntityId(4), score: 1.0 },
            MergeCandidate { left: EntityId(1), right: EntityId(2), score: 3.0 },
        ]);
        assert_eq!(ranked[0].left, EntityId(1));
        assert_eq!((ranked[1].left, ranked[1].right), (EntityId(4), EntityId(5)));
    }
}
