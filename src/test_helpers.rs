//! Test helper factories
//!
//! Provides convenience functions for creating entities, graphs and plans
//! with sensible defaults.
#![allow(dead_code)]

use std::collections::BTreeSet;

use crate::graph::{build, DependencyGraph};
use crate::model::{
    Attribute, Constraint, Entity, EntityId, Relationship, RelationshipKind, SemanticType,
};
use crate::plan::DecompositionPlan;

// ============================================================================
// Entity factories
// ============================================================================

/// Entity with an `Id` key and a required `Name` attribute.
pub fn test_entity(id: u64, name: &str) -> Entity {
    Entity::new(id, name)
        .with_attribute(Attribute::new("Id", SemanticType::Integer).with(Constraint::PrimaryKey))
        .with_attribute(
            Attribute::new("Name", SemanticType::Text)
                .with(Constraint::Required)
                .with(Constraint::MaxLength(100)),
        )
}

pub fn required(from: u64, to: u64) -> Relationship {
    Relationship::new(EntityId(from), EntityId(to), RelationshipKind::OneToMany, true)
}

pub fn optional(from: u64, to: u64) -> Relationship {
    Relationship::new(EntityId(from), EntityId(to), RelationshipKind::OneToMany, false)
}

// ============================================================================
// Graph / plan builders
// ============================================================================

/// User(1), Order(2), Product(3); Order → User and Order → Product, both required.
pub fn shop_graph() -> DependencyGraph {
    let entities = vec![
        test_entity(1, "User"),
        test_entity(2, "Order"),
        test_entity(3, "Product"),
    ];
    build(&entities, &[required(2, 1), required(2, 3)]).unwrap()
}

/// Version-1 plan with one service per `(name, member ids)` group; every
/// graph entity not listed is unassigned.
pub fn plan_of(graph: &DependencyGraph, groups: &[(&str, Vec<u64>)]) -> DecompositionPlan {
    let mut assigned = BTreeSet::new();
    let groups: Vec<(String, BTreeSet<EntityId>)> = groups
        .iter()
        .map(|(name, ids)| {
            let members: BTreeSet<EntityId> = ids.iter().copied().map(EntityId).collect();
            assigned.extend(members.iter().copied());
            (name.to_string(), members)
        })
        .collect();
    let unassigned = graph.entity_ids().filter(|e| !assigned.contains(e)).collect();
    DecompositionPlan::assemble(graph, groups, unassigned, false)
}
