//! Core data model shared by every stage of the pipeline.
//!
//! - [`ids`]: `EntityId`, `ServiceId`, `UnitId`
//! - [`entity`]: entities, attributes, relationships, `ExtractedModel`

pub mod entity;
pub mod ids;

pub use entity::{
    Attribute, Constraint, Entity, ExtractedModel, Relationship, RelationshipKind,
    RelationshipRef, SemanticType, OPTIONAL_WEIGHT, REQUIRED_WEIGHT,
};
pub use ids::{EntityId, ServiceId, UnitId};
