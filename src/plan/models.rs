//! Decomposition plan models
//!
//! A [`DecompositionPlan`] is an immutable value: the resolver produces the
//! first version, every accepted edit produces a new one with `version + 1`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::codegen::Identifier;
use crate::error::{DecompositionError, DecompositionResult};
use crate::graph::DependencyGraph;
use crate::model::{EntityId, ServiceId};

/// Weighted coupling between two members of the same service (`a < b`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InternalEdge {
    pub a: EntityId,
    pub b: EntityId,
    pub weight: u32,
}

/// Direction of a cross-service dependency, seen from the owning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// A local entity references a remote one: needs a client stub
    Outbound,
    /// A remote entity references a local one
    Inbound,
}

/// Cross-service dependency requiring a remote call in generated code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalEdge {
    pub local_entity: EntityId,
    pub remote_entity: EntityId,
    pub remote_service: ServiceId,
    pub direction: EdgeDirection,
    pub weight: u32,
}

/// (local entity, remote entity, direction) identifying one external edge.
type ExternalKey = (EntityId, EntityId, EdgeDirection);

/// A proposed cluster of entities intended to become one deployable service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroserviceCandidate {
    pub id: ServiceId,
    pub proposed_name: String,
    pub member_entity_ids: BTreeSet<EntityId>,
    #[serde(default)]
    pub internal_edges: Vec<InternalEdge>,
    #[serde(default)]
    pub external_edges: Vec<ExternalEdge>,
}

impl MicroserviceCandidate {
    pub fn new(
        id: ServiceId,
        proposed_name: impl Into<String>,
        members: BTreeSet<EntityId>,
    ) -> Self {
        Self {
            id,
            proposed_name: proposed_name.into(),
            member_entity_ids: members,
            internal_edges: Vec::new(),
            external_edges: Vec::new(),
        }
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.member_entity_ids.contains(&entity)
    }

    pub fn outbound_edges(&self) -> impl Iterator<Item = &ExternalEdge> {
        self.external_edges
            .iter()
            .filter(|e| e.direction == EdgeDirection::Outbound)
    }

    pub fn internal_weight(&self) -> u64 {
        self.internal_edges.iter().map(|e| e.weight as u64).sum()
    }
}

/// Full proposed (or finalized) partition of entities into services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompositionPlan {
    /// Monotonic version; compare-and-swap edits target it
    #[serde(default = "first_version")]
    pub version: u64,
    /// Ordered by service id
    pub services: Vec<MicroserviceCandidate>,
    #[serde(default)]
    pub unassigned_entities: BTreeSet<EntityId>,
    /// Set when the resolver stopped early on token budget exhaustion
    #[serde(default)]
    pub budget_truncated: bool,
}

fn first_version() -> u64 {
    1
}

/// Key used to detect duplicate service names: the snake-case identifier
/// the generator will derive, so two names collide here exactly when they
/// would collide in generated code.
pub fn service_name_key(name: &str) -> String {
    Identifier::new(name).snake().to_string()
}

impl DecompositionPlan {
    /// Assemble a version-1 plan from named groups, assigning service ids
    /// 1..k in the given order and deriving all edges from `graph`.
    pub fn assemble(
        graph: &DependencyGraph,
        groups: Vec<(String, BTreeSet<EntityId>)>,
        unassigned: BTreeSet<EntityId>,
        budget_truncated: bool,
    ) -> Self {
        let services = groups
            .into_iter()
            .enumerate()
            .map(|(i, (name, members))| {
                MicroserviceCandidate::new(ServiceId(i as u32 + 1), name, members)
            })
            .collect();
        let mut plan = Self {
            version: 1,
            services,
            unassigned_entities: unassigned,
            budget_truncated,
        };
        plan.recompute_edges(graph);
        plan
    }

    /// VALID only when nothing is unassigned.
    pub fn is_valid(&self) -> bool {
        self.unassigned_entities.is_empty()
    }

    pub fn service(&self, id: ServiceId) -> Option<&MicroserviceCandidate> {
        self.services.iter().find(|s| s.id == id)
    }

    pub(crate) fn service_mut(&mut self, id: ServiceId) -> Option<&mut MicroserviceCandidate> {
        self.services.iter_mut().find(|s| s.id == id)
    }

    pub fn service_by_name(&self, name: &str) -> Option<&MicroserviceCandidate> {
        let key = service_name_key(name);
        self.services
            .iter()
            .find(|s| service_name_key(&s.proposed_name) == key)
    }

    pub fn service_of(&self, entity: EntityId) -> Option<ServiceId> {
        self.services.iter().find(|s| s.contains(entity)).map(|s| s.id)
    }

    /// Entity → service map over all assigned entities.
    pub fn assignments(&self) -> BTreeMap<EntityId, ServiceId> {
        self.services
            .iter()
            .flat_map(|s| s.member_entity_ids.iter().map(move |e| (*e, s.id)))
            .collect()
    }

    pub fn next_service_id(&self) -> ServiceId {
        ServiceId(self.services.iter().map(|s| s.id.0).max().unwrap_or(0) + 1)
    }

    pub fn entity_count(&self) -> usize {
        self.services
            .iter()
            .map(|s| s.member_entity_ids.len())
            .sum::<usize>()
            + self.unassigned_entities.len()
    }

    /// Sum of the weights of every graph edge whose endpoints sit in
    /// different services (each entity pair counted once).
    pub fn cross_service_weight(&self, graph: &DependencyGraph) -> u64 {
        let assignments = self.assignments();
        graph
            .weighted_edges()
            .into_iter()
            .filter(|(a, b, _)| match (assignments.get(a), assignments.get(b)) {
                (Some(sa), Some(sb)) => sa != sb,
                _ => false,
            })
            .map(|(_, _, w)| w as u64)
            .sum()
    }

    /// Check the partition invariant against the full entity set: every
    /// entity exactly once, across services and `unassigned_entities`.
    pub fn check_partition(&self, expected: &BTreeSet<EntityId>) -> DecompositionResult<()> {
        let mut seen: BTreeMap<EntityId, String> = BTreeMap::new();
        let placements = self
            .services
            .iter()
            .flat_map(|s| s.member_entity_ids.iter().map(move |e| (*e, s.id.to_string())))
            .chain(
                self.unassigned_entities
                    .iter()
                    .map(|e| (*e, "unassigned_entities".to_string())),
            );

        for (entity, place) in placements {
            if !expected.contains(&entity) {
                return Err(DecompositionError::unknown_entity(entity));
            }
            if let Some(first) = seen.insert(entity, place.clone()) {
                return Err(DecompositionError::DuplicateAssignment {
                    entity,
                    context: format!("{} and {}", first, place),
                });
            }
        }

        if let Some(missing) = expected.iter().find(|e| !seen.contains_key(e)) {
            return Err(DecompositionError::InvalidEdit(format!(
                "entity {} is neither assigned to a service nor listed as unassigned",
                missing
            )));
        }
        Ok(())
    }

    /// Rebuild every service's internal and external edges from `graph`.
    pub fn recompute_edges(&mut self, graph: &DependencyGraph) {
        let assignments = self.assignments();

        let mut internal: BTreeMap<ServiceId, Vec<InternalEdge>> = BTreeMap::new();
        for (a, b, weight) in graph.weighted_edges() {
            if let (Some(sa), Some(sb)) = (assignments.get(&a), assignments.get(&b)) {
                if sa == sb {
                    internal.entry(*sa).or_default().push(InternalEdge { a, b, weight });
                }
            }
        }

        // Directed: one entry per (local, remote, direction), weights summed.
        let mut external: BTreeMap<ServiceId, BTreeMap<ExternalKey, (ServiceId, u32)>> =
            BTreeMap::new();
        for rel in graph.relationships.iter().filter(|r| !r.is_self_reference()) {
            let (Some(&from_svc), Some(&to_svc)) =
                (assignments.get(&rel.from_entity), assignments.get(&rel.to_entity))
            else {
                continue;
            };
            if from_svc == to_svc {
                continue;
            }
            let out = external
                .entry(from_svc)
                .or_default()
                .entry((rel.from_entity, rel.to_entity, EdgeDirection::Outbound))
                .or_insert((to_svc, 0));
            out.1 += rel.weight();
            let inb = external
                .entry(to_svc)
                .or_default()
                .entry((rel.to_entity, rel.from_entity, EdgeDirection::Inbound))
                .or_insert((from_svc, 0));
            inb.1 += rel.weight();
        }

        for service in self.services.iter_mut() {
            service.internal_edges = internal.remove(&service.id).unwrap_or_default();
            service.external_edges = external
                .remove(&service.id)
                .unwrap_or_default()
                .into_iter()
                .map(
                    |((local_entity, remote_entity, direction), (remote_service, weight))| {
                        ExternalEdge {
                            local_entity,
                            remote_entity,
                            remote_service,
                            direction,
                            weight,
                        }
                    },
                )
                .collect();
        }
    }
}
