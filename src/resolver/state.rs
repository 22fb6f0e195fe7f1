//! Cluster state of the agglomeration loop.
//!
//! Clusters are keyed by their smallest member id, and inter-cluster link
//! weights are kept per ordered key pair. Merging re-keys and sums links
//! (sum linkage), so no weight is ever recomputed from scratch.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::DependencyGraph;
use crate::model::EntityId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterState {
    clusters: BTreeMap<EntityId, BTreeSet<EntityId>>,
    links: BTreeMap<(EntityId, EntityId), u32>,
}

impl ClusterState {
    /// Every entity in its own cluster, links = graph edges.
    pub fn singletons(graph: &DependencyGraph) -> Self {
        let clusters = graph
            .entity_ids()
            .map(|id| (id, BTreeSet::from([id])))
            .collect();
        let links = graph
            .weighted_edges()
            .into_iter()
            .map(|(a, b, w)| ((a, b), w))
            .collect();
        Self { clusters, links }
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn clusters(&self) -> &BTreeMap<EntityId, BTreeSet<EntityId>> {
        &self.clusters
    }

    pub fn members(&self, key: EntityId) -> Option<&BTreeSet<EntityId>> {
        self.clusters.get(&key)
    }

    /// Inter-cluster links as `((low key, high key), weight)`, ascending.
    pub fn links(&self) -> &BTreeMap<(EntityId, EntityId), u32> {
        &self.links
    }

    pub fn link_weight(&self, a: EntityId, b: EntityId) -> u32 {
        self.links.get(&(a.min(b), a.max(b))).copied().unwrap_or(0)
    }

    /// Linked clusters of `key` with weights, ordered by key.
    pub fn neighbors(&self, key: EntityId) -> Vec<(EntityId, u32)> {
        let mut out: Vec<(EntityId, u32)> = self
            .links
            .iter()
            .filter_map(|((a, b), w)| {
                if *a == key {
                    Some((*b, *w))
                } else if *b == key {
                    Some((*a, *w))
                } else {
                    None
                }
            })
            .collect();
        out.sort();
        out
    }

    /// Merge two clusters; returns the surviving key (the smaller one).
    pub fn merge(&mut self, a: EntityId, b: EntityId) -> Option<EntityId> {
        if a == b || !self.clusters.contains_key(&a) || !self.clusters.contains_key(&b) {
            return None;
        }
        let (keep, absorb) = (a.min(b), a.max(b));
        let absorbed = self.clusters.remove(&absorb)?;
        self.clusters.entry(keep).or_default().extend(absorbed);

        let old = std::mem::take(&mut self.links);
        for ((x, y), w) in old {
            let x = if x == absorb { keep } else { x };
            let y = if y == absorb { keep } else { y };
            if x == y {
                continue;
            }
            *self.links.entry((x.min(y), x.max(y))).or_insert(0) += w;
        }
        Some(keep)
    }

    /// Drop a cluster and its links, returning its members.
    pub fn remove(&mut self, key: EntityId) -> Option<BTreeSet<EntityId>> {
        let members = self.clusters.remove(&key)?;
        self.links.retain(|(a, b), _| *a != key && *b != key);
        Some(members)
    }
}
