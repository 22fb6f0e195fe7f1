//! Coupling metrics over a [`DependencyGraph`].
//!
//! - **Degree / weighted degree**: from the undirected graph
//! - **Fan-in / fan-out / instability**: from the directed relationships
//! - **Connected components**: via `petgraph::algo::connected_components`

use std::collections::BTreeMap;

use super::models::{CouplingMetrics, DependencyGraph, EntityCoupling};
use crate::model::EntityId;

/// Compute coupling metrics for every entity in the graph.
pub fn compute(graph: &DependencyGraph) -> CouplingMetrics {
    let mut fan_in: BTreeMap<EntityId, usize> = BTreeMap::new();
    let mut fan_out: BTreeMap<EntityId, usize> = BTreeMap::new();
    for rel in graph.relationships.iter().filter(|r| !r.is_self_reference()) {
        *fan_out.entry(rel.from_entity).or_insert(0) += 1;
        *fan_in.entry(rel.to_entity).or_insert(0) += 1;
    }

    let mut entities = BTreeMap::new();
    let mut most_coupled: Option<(EntityId, u32)> = None;

    for id in graph.entity_ids() {
        let neighbors = graph.neighbors(id);
        let weighted_degree: u32 = neighbors.iter().map(|(_, w)| w).sum();
        let fi = fan_in.get(&id).copied().unwrap_or(0);
        let fo = fan_out.get(&id).copied().unwrap_or(0);
        let instability = if fi + fo > 0 {
            fo as f64 / (fi + fo) as f64
        } else {
            0.0
        };

        // Ascending id iteration: strict > keeps the lowest id on ties.
        match most_coupled {
            Some((_, best)) if weighted_degree <= best => {}
            _ => most_coupled = Some((id, weighted_degree)),
        }

        entities.insert(
            id,
            EntityCoupling {
                degree: neighbors.len(),
                weighted_degree,
                fan_in: fi,
                fan_out: fo,
                instability,
            },
        );
    }

    CouplingMetrics {
        entities,
        edge_count: graph.edge_count(),
        total_edge_weight: graph.total_weight(),
        component_count: if graph.is_empty() {
            0
        } else {
            petgraph::algo::connected_components(&graph.graph)
        },
        most_coupled: most_coupled.map(|(id, _)| id),
    }
}

/// Member with the largest weighted degree; ties go to the lowest id.
pub fn most_coupled_member(
    graph: &DependencyGraph,
    members: impl IntoIterator<Item = EntityId>,
) -> Option<EntityId> {
    let mut best: Option<(EntityId, u32)> = None;
    for id in members {
        let w = graph.weighted_degree(id);
        best = match best {
            Some((best_id, best_w)) if w < best_w || (w == best_w && id > best_id) => {
                Some((best_id, best_w))
            }
            _ => Some((id, w)),
        };
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::build;
    use crate::model::{Entity, Relationship, RelationshipKind};

    fn shop() -> DependencyGraph {
        let es = vec![
            Entity::new(1u64, "User"),
            Entity::new(2u64, "Order"),
            Entity::new(3u64, "Product"),
            Entity::new(4u64, "AuditLog"),
        ];
        let rels = vec![
            Relationship::new(EntityId(2), EntityId(1), RelationshipKind::OneToMany, true),
            Relationship::new(EntityId(2), EntityId(3), RelationshipKind::OneToMany, true),
        ];
        build(&es, &rels).unwrap()
    }

    #[test]
    fn test_metrics_fan_and_instability() {
        let metrics = compute(&shop());
        let order = &metrics.entities[&EntityId(2)];
        assert_eq!(order.degree, 2);
        assert_eq!(order.weighted_degree, 4);
        assert_eq!(order.fan_out, 2);
        assert_eq!(order.fan_in, 0);
        assert!((order.instability - 1.0).abs() < f64::EPSILON);

        let user = &metrics.entities[&EntityId(1)];
        assert_eq!(user.fan_in, 1);
        assert_eq!(user.instability, 0.0);

        assert_eq!(metrics.edge_count, 2);
        assert_eq!(metrics.total_edge_weight, 4);
        assert_eq!(metrics.component_count, 2);
        assert_eq!(metrics.most_coupled, Some(EntityId(2)));
    }

    #[test]
    fn test_most_coupled_member_tie_breaks_on_lowest_id() {
        let graph = shop();
        assert_eq!(
            most_coupled_member(&graph, [EntityId(3), EntityId(1)]),
            Some(EntityId(1))
        );
        assert_eq!(most_coupled_member(&graph, [EntityId(4)]), Some(EntityId(4)));
        assert_eq!(most_coupled_member(&graph, []), None);
    }

    #[test]
    fn test_metrics_empty_graph() {
        let graph = build(&[], &[]).unwrap();
        let metrics = compute(&graph);
        assert!(metrics.entities.is_empty());
        assert_eq!(metrics.component_count, 0);
        assert_eq!(metrics.most_coupled, None);
    }
}
