//! Entity shape as seen by the generators: named fields with target types.

use crate::error::DecompositionResult;
use crate::model::{Attribute, Entity, EntityId, SemanticType};

use super::naming::{Identifier, NameRegistry};

/// One attribute, resolved to identifiers and a target type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldModel {
    pub ident: Identifier,
    pub semantic_type: SemanticType,
    pub optional: bool,
    pub key: bool,
    pub max_length: Option<u32>,
}

impl FieldModel {
    fn from_attribute(ident: Identifier, attribute: &Attribute) -> Self {
        Self {
            ident,
            semantic_type: attribute.semantic_type.clone(),
            optional: !attribute.is_required(),
            key: attribute.is_primary_key(),
            max_length: attribute.max_length(),
        }
    }

    fn synthesized_key() -> Self {
        Self {
            ident: Identifier::new("Id"),
            semantic_type: SemanticType::BigInteger,
            optional: false,
            key: true,
            max_length: None,
        }
    }

    /// Rust type without the `Option` wrapper.
    pub fn base_rust_type(&self) -> &'static str {
        rust_type(&self.semantic_type)
    }

    pub fn rust_type(&self) -> String {
        if self.optional {
            format!("Option<{}>", self.base_rust_type())
        } else {
            self.base_rust_type().to_string()
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.semantic_type, SemanticType::Text)
    }
}

pub fn rust_type(semantic: &SemanticType) -> &'static str {
    match semantic {
        SemanticType::Integer => "i32",
        SemanticType::BigInteger => "i64",
        SemanticType::Decimal | SemanticType::Float => "f64",
        SemanticType::Boolean => "bool",
        SemanticType::Text | SemanticType::Other(_) => "String",
        SemanticType::DateTime => "chrono::DateTime<chrono::Utc>",
        SemanticType::Date => "chrono::NaiveDate",
        SemanticType::Uuid => "uuid::Uuid",
        SemanticType::Binary => "Vec<u8>",
    }
}

/// An entity ready for rendering: key field first, then attributes in
/// source order.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityModel {
    pub id: EntityId,
    pub ident: Identifier,
    pub fields: Vec<FieldModel>,
    pub synthesized_key: bool,
}

impl EntityModel {
    pub fn from_entity(entity: &Entity, ident: Identifier) -> DecompositionResult<Self> {
        let mut names = NameRegistry::new();
        let mut fields = Vec::with_capacity(entity.attributes.len() + 1);
        let mut key_index = None;

        for attribute in &entity.attributes {
            let field = FieldModel::from_attribute(names.claim(&attribute.name)?, attribute);
            if field.key && key_index.is_none() {
                key_index = Some(fields.len());
            } else if field.key {
                // Composite keys are flattened: only the first stays the key
                fields.push(FieldModel { key: false, ..field });
                continue;
            }
            fields.push(field);
        }

        // Without a declared key, an `id` attribute is promoted before one
        // is synthesized.
        let key_index = key_index.or_else(|| fields.iter().position(|f| f.ident.snake() == "id"));
        let synthesized_key = key_index.is_none();
        match key_index {
            Some(i) => {
                let key = fields.remove(i);
                fields.insert(
                    0,
                    FieldModel {
                        key: true,
                        optional: false,
                        ..key
                    },
                );
            }
            None => fields.insert(0, FieldModel::synthesized_key()),
        }

        Ok(Self {
            id: entity.id,
            ident,
            fields,
            synthesized_key,
        })
    }

    pub fn key(&self) -> &FieldModel {
        &self.fields[0]
    }

    /// Every field except the key.
    pub fn data_fields(&self) -> &[FieldModel] {
        &self.fields[1..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Constraint;
    use crate::test_helpers::test_entity;

    #[test]
    fn test_key_first_and_optionality() {
        let entity = test_entity(1, "Widget")
            .with_attribute(Attribute::new("Notes", SemanticType::Text));
        let model = EntityModel::from_entity(&entity, Identifier::new("Widget")).unwrap();
        assert!(!model.synthesized_key);
        assert_eq!(model.key().ident.snake(), "id");
        assert_eq!(model.key().rust_type(), "i32");
        assert_eq!(model.data_fields().len(), 2);
        assert_eq!(model.data_fields()[0].rust_type(), "String");
        assert_eq!(model.data_fields()[0].max_length, Some(100));
        assert_eq!(model.data_fields()[1].rust_type(), "Option<String>");
    }

    #[test]
    fn test_synthesized_key() {
        let entity = Entity::new(7, "Tag").with_attribute(
            Attribute::new("Label", SemanticType::Text).with(Constraint::Required),
        );
        let model = EntityModel::from_entity(&entity, Identifier::new("Tag")).unwrap();
        assert!(model.synthesized_key);
        assert_eq!(model.key().rust_type(), "i64");
        assert_eq!(model.fields.len(), 2);

        let promoted =
            Entity::new(8, "Note").with_attribute(Attribute::new("ID", SemanticType::Uuid));
        let model = EntityModel::from_entity(&promoted, Identifier::new("Note")).unwrap();
        assert!(!model.synthesized_key);
        assert_eq!(model.key().rust_type(), "uuid::Uuid");
        assert_eq!(model.fields.len(), 1);
    }

    #[test]
    fn test_colliding_attribute_names() {
        let entity = Entity::new(1, "Bad")
            .with_attribute(Attribute::new("OrderDate", SemanticType::Date))
            .with_attribute(Attribute::new("order_date", SemanticType::Date));
        assert!(EntityModel::from_entity(&entity, Identifier::new("Bad")).is_err());
    }
}
