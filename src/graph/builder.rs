//! Dependency Graph Builder.
//!
//! Pure function of `(entities, relationships)`: validates identity and
//! references, then aggregates relationship weights per unordered entity
//! pair into an undirected petgraph graph.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::models::DependencyGraph;
use crate::error::{DecompositionError, DecompositionResult};
use crate::model::{Entity, EntityId, ExtractedModel, Relationship};

/// Build the coupling graph.
///
/// Relationships are taken from `relationships` and from each entity's own
/// relationship set; identical relationships are counted once. Fails with
/// `DuplicateEntityId` or `UnknownEntityReference`.
pub fn build(
    entities: &[Entity],
    relationships: &[Relationship],
) -> DecompositionResult<DependencyGraph> {
    let mut seen: BTreeSet<EntityId> = BTreeSet::new();
    for entity in entities {
        if !seen.insert(entity.id) {
            return Err(DecompositionError::DuplicateEntityId(entity.id));
        }
    }

    let mut canonical: BTreeSet<Relationship> = relationships.iter().cloned().collect();
    for entity in entities {
        for r in &entity.relationships {
            canonical.insert(Relationship::new(entity.id, r.to_entity, r.kind, r.required));
        }
    }

    for rel in &canonical {
        for endpoint in [rel.from_entity, rel.to_entity] {
            if !seen.contains(&endpoint) {
                return Err(DecompositionError::UnknownEntityReference {
                    from: rel.from_entity,
                    missing: endpoint,
                });
            }
        }
    }

    // Aggregate per unordered pair; self references carry no coupling.
    let mut pair_weights: BTreeMap<(EntityId, EntityId), u32> = BTreeMap::new();
    for rel in canonical.iter().filter(|r| !r.is_self_reference()) {
        let key = (
            rel.from_entity.min(rel.to_entity),
            rel.from_entity.max(rel.to_entity),
        );
        *pair_weights.entry(key).or_insert(0) += rel.weight();
    }

    let mut sorted: Vec<&Entity> = entities.iter().collect();
    sorted.sort_by_key(|e| e.id);

    let mut graph = DependencyGraph::with_capacity(sorted.len(), pair_weights.len());
    for entity in sorted {
        let mut owned = entity.clone();
        owned.relationships = canonical
            .iter()
            .filter(|r| r.from_entity == entity.id)
            .map(|r| crate::model::RelationshipRef {
                to_entity: r.to_entity,
                kind: r.kind,
                required: r.required,
            })
            .collect();
        graph.add_entity(owned);
    }
    for ((a, b), weight) in &pair_weights {
        if let (Some(ia), Some(ib)) = (graph.get_index(*a), graph.get_index(*b)) {
            graph.graph.add_edge(ia, ib, *weight);
        }
    }
    graph.relationships = canonical.into_iter().collect();

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        total_weight = graph.total_weight(),
        "Dependency graph built"
    );

    Ok(graph)
}

/// Convenience wrapper over [`build`] for an extractor's output.
pub fn build_from_model(model: &ExtractedModel) -> DecompositionResult<DependencyGraph> {
    build(&model.entities, &model.relationships)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RelationshipKind;

    fn rel(from: u64, to: u64, required: bool) -> Relationship {
        Relationship::new(EntityId(from), EntityId(to), RelationshipKind::OneToMany, required)
    }

    fn entities(names: &[(u64, &str)]) -> Vec<Entity> {
        names.iter().map(|(id, n)| Entity::new(*id, *n)).collect()
    }

    #[test]
    fn test_build_aggregates_weights_across_directions() {
        let es = entities(&[(1, "User"), (2, "Order")]);
        let graph = build(&es, &[rel(2, 1, true), rel(1, 2, false)]).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.weight_between(EntityId(1), EntityId(2)), 3);
        assert_eq!(graph.weight_between(EntityId(2), EntityId(1)), 3);
    }

    #[test]
    fn test_build_rejects_unknown_reference() {
        let es = entities(&[(1, "User"), (2, "Order")]);
        let err = build(&es, &[rel(2, 9, true)]).unwrap_err();
        assert_eq!(
            err,
            DecompositionError::UnknownEntityReference {
                from: EntityId(2),
                missing: EntityId(9)
            }
        );
    }

    #[test]
    fn test_build_rejects_duplicate_ids() {
        let es = entities(&[(1, "User"), (1, "Customer")]);
        let err = build(&es, &[]).unwrap_err();
        assert_eq!(err, DecompositionError::DuplicateEntityId(EntityId(1)));
    }

    #[test]
    fn test_self_reference_kept_but_not_an_edge() {
        let es = entities(&[(1, "Category")]);
        let graph = build(&es, &[rel(1, 1, false)]).unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.relationships.len(), 1);
        assert_eq!(graph.weighted_degree(EntityId(1)), 0);
    }

    #[test]
    fn test_entity_refs_merge_with_relationship_list() {
        let mut order = Entity::new(2u64, "Order");
        order.relationships.insert(crate::model::RelationshipRef {
            to_entity: EntityId(1),
            kind: RelationshipKind::OneToMany,
            required: true,
        });
        let es = vec![Entity::new(1u64, "User"), order];
        // Same relationship given twice: once on the entity, once in the list.
        let graph = build(&es, &[rel(2, 1, true)]).unwrap();
        assert_eq!(graph.weight_between(EntityId(1), EntityId(2)), 2);
        assert_eq!(graph.relationships.len(), 1);
    }

    #[test]
    fn test_neighbors_sorted_by_id() {
        let es = entities(&[(1, "User"), (2, "Order"), (3, "Product")]);
        let graph = build(&es, &[rel(2, 3, true), rel(2, 1, false)]).unwrap();
        assert_eq!(
            graph.neighbors(EntityId(2)),
            vec![(EntityId(1), 1), (EntityId(3), 2)]
        );
        assert_eq!(graph.weighted_degree(EntityId(2)), 3);
        assert_eq!(
            graph.weighted_edges(),
            vec![(EntityId(1), EntityId(2), 1), (EntityId(2), EntityId(3), 2)]
        );
    }
}
