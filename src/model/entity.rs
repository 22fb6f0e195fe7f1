//! Entity model consumed from the extraction front-end.
//!
//! ## Types
//! - [`Entity`] / [`Attribute`] / [`Constraint`]: data concepts of the monolith
//! - [`Relationship`] / [`RelationshipKind`]: directed links between entities
//! - [`ExtractedModel`]: the normalized `(entities, relationships)` pair

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::EntityId;

/// Edge weight contributed by a required relationship.
pub const REQUIRED_WEIGHT: u32 = 2;
/// Edge weight contributed by an optional relationship.
pub const OPTIONAL_WEIGHT: u32 = 1;

// ============================================================================
// Attributes
// ============================================================================

/// Semantic type of an entity attribute, independent of any source language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    BigInteger,
    Decimal,
    Float,
    Boolean,
    Text,
    DateTime,
    Date,
    Uuid,
    Binary,
    /// Anything the front-end could not classify (kept verbatim).
    Other(String),
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::BigInteger => write!(f, "big_integer"),
            Self::Decimal => write!(f, "decimal"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::Text => write!(f, "text"),
            Self::DateTime => write!(f, "date_time"),
            Self::Date => write!(f, "date"),
            Self::Uuid => write!(f, "uuid"),
            Self::Binary => write!(f, "binary"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Column-level constraint attached to an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Required,
    PrimaryKey,
    Unique,
    MaxLength(u32),
}

/// A single attribute of an entity, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub semantic_type: SemanticType,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            constraints: Vec::new(),
        }
    }

    /// Builder-style constraint append.
    pub fn with(mut self, constraint: Constraint) -> Self {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.constraints.contains(&Constraint::PrimaryKey)
    }

    /// Primary keys are always required.
    pub fn is_required(&self) -> bool {
        self.is_primary_key() || self.constraints.contains(&Constraint::Required)
    }

    pub fn max_length(&self) -> Option<u32> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::MaxLength(n) => Some(*n),
            _ => None,
        })
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// Multiplicity of a relationship, read as `to_entity : from_entity`.
///
/// `Order -> Customer` with `OneToMany` means one customer has many orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    OneToOne,
    OneToMany,
    ManyToMany,
}

/// Directed dependency: `from_entity` references `to_entity`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub from_entity: EntityId,
    pub to_entity: EntityId,
    pub kind: RelationshipKind,
    pub required: bool,
}

impl Relationship {
    pub fn new(from: EntityId, to: EntityId, kind: RelationshipKind, required: bool) -> Self {
        Self {
            from_entity: from,
            to_entity: to,
            kind,
            required,
        }
    }

    /// Coupling weight: required links count double so the resolver avoids
    /// splitting them across services.
    pub fn weight(&self) -> u32 {
        if self.required {
            REQUIRED_WEIGHT
        } else {
            OPTIONAL_WEIGHT
        }
    }

    pub fn is_self_reference(&self) -> bool {
        self.from_entity == self.to_entity
    }
}

/// Outgoing relationship as seen from the owning entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipRef {
    pub to_entity: EntityId,
    pub kind: RelationshipKind,
    pub required: bool,
}

// ============================================================================
// Entities
// ============================================================================

/// A data concept extracted from the monolith. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub relationships: BTreeSet<RelationshipRef>,
    /// Source file the entity was declared in, relative to the source tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            attributes: Vec::new(),
            relationships: BTreeSet::new(),
            source_path: None,
        }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Output contract of an extraction front-end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedModel {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl ExtractedModel {
    /// Normalize a raw `(entities, relationships)` pair.
    ///
    /// Entities are ordered by id, relationships are sorted and deduplicated,
    /// and each entity's `relationships` set is rebuilt from the canonical list.
    /// Reference validity is checked later by the graph builder.
    pub fn new(mut entities: Vec<Entity>, mut relationships: Vec<Relationship>) -> Self {
        entities.sort_by_key(|e| e.id);
        relationships.sort();
        relationships.dedup();

        for entity in entities.iter_mut() {
            entity.relationships = relationships
                .iter()
                .filter(|r| r.from_entity == entity.id)
                .map(|r| RelationshipRef {
                    to_entity: r.to_entity,
                    kind: r.kind,
                    required: r.required,
                })
                .collect();
        }

        Self {
            entities,
            relationships,
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|idx| &self.entities[idx])
    }

    pub fn entity_ids(&self) -> BTreeSet<EntityId> {
        self.entities.iter().map(|e| e.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_weight() {
        let required =
            Relationship::new(EntityId(2), EntityId(1), RelationshipKind::OneToMany, true);
        let optional =
            Relationship::new(EntityId(2), EntityId(3), RelationshipKind::OneToMany, false);
        assert_eq!(required.weight(), REQUIRED_WEIGHT);
        assert_eq!(optional.weight(), OPTIONAL_WEIGHT);
    }

    #[test]
    fn test_attribute_required_markers() {
        let key = Attribute::new("Id", SemanticType::Integer).with(Constraint::PrimaryKey);
        let name = Attribute::new("Name", SemanticType::Text)
            .with(Constraint::Required)
            .with(Constraint::MaxLength(50));
        let note = Attribute::new("Note", SemanticType::Text);

        assert!(key.is_required());
        assert!(name.is_required());
        assert_eq!(name.max_length(), Some(50));
        assert!(!note.is_required());
        assert_eq!(note.max_length(), None);
    }

    #[test]
    fn test_extracted_model_normalizes_order_and_refs() {
        let model = ExtractedModel::new(
            vec![
                Entity::new(3u64, "Product"),
                Entity::new(1u64, "User"),
                Entity::new(2u64, "Order"),
            ],
            vec![
                Relationship::new(EntityId(2), EntityId(3), RelationshipKind::OneToMany, true),
                Relationship::new(EntityId(2), EntityId(1), RelationshipKind::OneToMany, true),
                Relationship::new(EntityId(2), EntityId(1), RelationshipKind::OneToMany, true),
            ],
        );

        let ids: Vec<u64> = model.entities.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(model.relationships.len(), 2);

        let order = model.entity(EntityId(2)).unwrap();
        assert_eq!(order.relationships.len(), 2);
        assert!(model.entity(EntityId(1)).unwrap().relationships.is_empty());
        assert!(model.entity(EntityId(9)).is_none());
    }

    #[test]
    fn test_semantic_type_serde() {
        let json = serde_json::to_string(&SemanticType::DateTime).unwrap();
        assert_eq!(json, "\"date_time\"");
        let other: SemanticType = serde_json::from_str(r#"{"other":"Money"}"#).unwrap();
        assert_eq!(other, SemanticType::Other("Money".into()));
    }
}
