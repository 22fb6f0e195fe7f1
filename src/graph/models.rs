//! Dependency graph data models.
//!
//! ## Input types
//! - [`Entity`] / [`Relationship`] from [`crate::model`]
//!
//! ## Graph
//! - [`EntityNode`]: node payload (id + name)
//! - [`DependencyGraph`]: petgraph wrapper with `EntityId` ↔ `NodeIndex` mapping
//!
//! ## Output types
//! - [`EntityCoupling`]: per-entity coupling scores
//! - [`CouplingMetrics`]: aggregated result of a metrics pass

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Entity, EntityId, Relationship};

// ============================================================================
// DependencyGraph: petgraph wrapper with ID mapping
// ============================================================================

/// Node payload stored in the petgraph graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: EntityId,
    pub name: String,
}

/// Undirected weighted coupling graph over the extracted entities.
///
/// Edge weight between two entities is the sum of the weights of every
/// relationship connecting them, in either direction. Self references are
/// kept in [`DependencyGraph::relationships`] but never become edges.
///
/// Nodes and edges are inserted in ascending id order, so `NodeIndex`
/// assignment is identical for identical input.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// The underlying undirected graph
    pub graph: UnGraph<EntityNode, u32>,
    /// Mapping from entity id to petgraph NodeIndex
    pub id_to_index: BTreeMap<EntityId, NodeIndex>,
    /// Full entity definitions, needed downstream by the code generator
    pub entities: BTreeMap<EntityId, Entity>,
    /// Canonical (sorted, deduplicated) directed relationships
    pub relationships: Vec<Relationship>,
}

impl DependencyGraph {
    pub(crate) fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            graph: UnGraph::with_capacity(nodes, edges),
            id_to_index: BTreeMap::new(),
            entities: BTreeMap::new(),
            relationships: Vec::new(),
        }
    }

    /// Add a node. If the id already exists, returns its existing index.
    pub(crate) fn add_entity(&mut self, entity: Entity) -> NodeIndex {
        if let Some(&idx) = self.id_to_index.get(&entity.id) {
            return idx;
        }
        let idx = self.graph.add_node(EntityNode {
            id: entity.id,
            name: entity.name.clone(),
        });
        self.id_to_index.insert(entity.id, idx);
        self.entities.insert(entity.id, entity);
        idx
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.id_to_index.contains_key(&id)
    }

    pub fn get_index(&self, id: EntityId) -> Option<NodeIndex> {
        self.id_to_index.get(&id).copied()
    }

    /// Entity ids in ascending order.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.id_to_index.keys().copied()
    }

    /// Aggregated weight of the edge between `a` and `b`, 0 when unconnected.
    pub fn weight_between(&self, a: EntityId, b: EntityId) -> u32 {
        match (self.get_index(a), self.get_index(b)) {
            (Some(ia), Some(ib)) if ia != ib => self
                .graph
                .find_edge(ia, ib)
                .and_then(|e| self.graph.edge_weight(e).copied())
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Neighbours of `id` with edge weights, ordered by neighbour id.
    pub fn neighbors(&self, id: EntityId) -> Vec<(EntityId, u32)> {
        let Some(idx) = self.get_index(id) else {
            return Vec::new();
        };
        let mut out: Vec<(EntityId, u32)> = self
            .graph
            .edges(idx)
            .map(|e| {
                let other = if e.source() == idx { e.target() } else { e.source() };
                (self.graph[other].id, *e.weight())
            })
            .collect();
        out.sort();
        out
    }

    /// Sum of the weights of every edge touching `id`.
    pub fn weighted_degree(&self, id: EntityId) -> u32 {
        self.neighbors(id).iter().map(|(_, w)| w).sum()
    }

    /// Every weighted edge as `(low id, high id, weight)`, ascending.
    pub fn weighted_edges(&self) -> Vec<(EntityId, EntityId, u32)> {
        let mut out: Vec<(EntityId, EntityId, u32)> = self
            .graph
            .edge_references()
            .map(|e| {
                let a = self.graph[e.source()].id;
                let b = self.graph[e.target()].id;
                (a.min(b), a.max(b), *e.weight())
            })
            .collect();
        out.sort();
        out
    }

    pub fn total_weight(&self) -> u64 {
        self.graph.edge_weights().map(|w| *w as u64).sum()
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

// ============================================================================
// Output types: coupling metrics
// ============================================================================

/// Coupling scores of a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCoupling {
    /// Number of distinct neighbours in the undirected graph
    pub degree: usize,
    /// Sum of incident edge weights
    pub weighted_degree: u32,
    /// Relationships pointing at this entity (self references excluded)
    pub fan_in: usize,
    /// Relationships leaving this entity (self references excluded)
    pub fan_out: usize,
    /// fan_out / (fan_in + fan_out), 0.0 for isolated entities
    pub instability: f64,
}

/// Aggregated coupling metrics for a whole graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingMetrics {
    pub entities: BTreeMap<EntityId, EntityCoupling>,
    pub edge_count: usize,
    pub total_edge_weight: u64,
    /// Connected components in the undirected graph
    pub component_count: usize,
    /// Entity with the highest weighted degree (ties → lowest id)
    pub most_coupled: Option<EntityId>,
}
