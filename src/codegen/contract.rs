//! Abstract service contract and the renderers that map it onto a
//! concrete RPC technology.

use askama::Template;
use serde::Serialize;

use super::fields::{EntityModel, FieldModel};
use super::naming::Identifier;
use super::templates::{render, ProtoFieldView, ProtoMessageView, ProtoRpcView, ProtoTemplate};
use crate::error::DecompositionResult;
use crate::model::SemanticType;

// ============================================================================
// Contract model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    Int32,
    Int64,
    UInt32,
    Double,
    Bool,
    String,
    Bytes,
    Timestamp,
    Message(String),
}

impl ContractType {
    pub fn of(semantic: &SemanticType) -> Self {
        match semantic {
            SemanticType::Integer => Self::Int32,
            SemanticType::BigInteger => Self::Int64,
            SemanticType::Decimal | SemanticType::Float => Self::Double,
            SemanticType::Boolean => Self::Bool,
            SemanticType::DateTime | SemanticType::Date => Self::Timestamp,
            SemanticType::Binary => Self::Bytes,
            SemanticType::Text | SemanticType::Uuid | SemanticType::Other(_) => Self::String,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractField {
    pub name: String,
    pub ty: ContractType,
    pub optional: bool,
    pub repeated: bool,
}

impl ContractField {
    fn scalar(name: &str, ty: ContractType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            optional: false,
            repeated: false,
        }
    }

    fn from_field(field: &FieldModel) -> Self {
        Self {
            name: field.ident.snake().to_string(),
            ty: ContractType::of(&field.semantic_type),
            optional: field.optional,
            repeated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractMessage {
    pub name: String,
    pub fields: Vec<ContractField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrudVerb {
    Create,
    Get,
    Update,
    Delete,
    List,
}

impl CrudVerb {
    pub const ALL: [CrudVerb; 5] = [
        Self::Create,
        Self::Get,
        Self::Update,
        Self::Delete,
        Self::List,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Get => "Get",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::List => "List",
        }
    }

    pub fn http_method(&self) -> &'static str {
        match self {
            Self::Create => "POST",
            Self::Get | Self::List => "GET",
            Self::Update => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the route addresses one record by key.
    pub fn is_keyed(&self) -> bool {
        matches!(self, Self::Get | Self::Update | Self::Delete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractOperation {
    pub name: String,
    pub verb: CrudVerb,
    pub entity: String,
    pub request: String,
    pub response: String,
}

/// Technology-neutral description of one service's RPC surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceContract {
    pub service: String,
    pub package: String,
    pub messages: Vec<ContractMessage>,
    pub operations: Vec<ContractOperation>,
}

impl ServiceContract {
    /// CRUD + list for every entity, in the given entity order.
    pub fn for_entities(
        service: &Identifier,
        package_prefix: &str,
        entities: &[EntityModel],
    ) -> Self {
        let package = if package_prefix.is_empty() {
            service.snake().to_string()
        } else {
            format!("{}.{}", package_prefix, service.snake())
        };

        let mut messages = Vec::new();
        let mut operations = Vec::new();
        for entity in entities {
            let name = entity.ident.pascal();
            let all: Vec<ContractField> =
                entity.fields.iter().map(ContractField::from_field).collect();
            let key = vec![ContractField::from_field(entity.key())];

            messages.push(ContractMessage {
                name: name.to_string(),
                fields: all.clone(),
            });
            messages.push(ContractMessage {
                name: format!("Create{}Request", name),
                fields: all.clone(),
            });
            messages.push(ContractMessage {
                name: format!("Get{}Request", name),
                fields: key.clone(),
            });
            messages.push(ContractMessage {
                name: format!("Update{}Request", name),
                fields: all,
            });
            messages.push(ContractMessage {
                name: format!("Delete{}Request", name),
                fields: key,
            });
            messages.push(ContractMessage {
                name: format!("Delete{}Response", name),
                fields: vec![ContractField::scalar("deleted", ContractType::Bool)],
            });
            messages.push(ContractMessage {
                name: format!("List{}Request", name),
                fields: vec![
                    ContractField::scalar("offset", ContractType::UInt32),
                    ContractField::scalar("limit", ContractType::UInt32),
                ],
            });
            messages.push(ContractMessage {
                name: format!("List{}Response", name),
                fields: vec![ContractField {
                    name: "items".into(),
                    ty: ContractType::Message(name.to_string()),
                    optional: false,
                    repeated: true,
                }],
            });

            for verb in CrudVerb::ALL {
                let response = match verb {
                    CrudVerb::Delete | CrudVerb::List => {
                        format!("{}{}Response", verb.prefix(), name)
                    }
                    _ => name.to_string(),
                };
                operations.push(ContractOperation {
                    name: format!("{}{}", verb.prefix(), name),
                    verb,
                    entity: name.to_string(),
                    request: format!("{}{}Request", verb.prefix(), name),
                    response,
                });
            }
        }

        Self {
            service: service.pascal().to_string(),
            package,
            messages,
            operations,
        }
    }

    /// Fully qualified RPC service name, e.g. `shop.orders.OrdersService`.
    pub fn qualified_service(&self) -> String {
        format!("{}.{}Service", self.package, self.service)
    }
}

// ============================================================================
// Renderers
// ============================================================================

/// Maps a [`ServiceContract`] to a concrete RPC technology.
pub trait ContractRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    /// File extension of the rendered contract, without the dot.
    fn extension(&self) -> &'static str;

    fn render(&self, contract: &ServiceContract) -> DecompositionResult<String>;
}

/// proto3 / gRPC.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoRenderer;

impl ProtoRenderer {
    fn scalar(ty: &ContractType) -> String {
        match ty {
            ContractType::Int32 => "int32".into(),
            ContractType::Int64 => "int64".into(),
            ContractType::UInt32 => "uint32".into(),
            ContractType::Double => "double".into(),
            ContractType::Bool => "bool".into(),
            // ISO-8601 text keeps the contract free of well-known imports
            ContractType::String | ContractType::Timestamp => "string".into(),
            ContractType::Bytes => "bytes".into(),
            ContractType::Message(name) => name.clone(),
        }
    }
}

impl ContractRenderer for ProtoRenderer {
    fn name(&self) -> &'static str {
        "proto3"
    }

    fn extension(&self) -> &'static str {
        "proto"
    }

    fn render(&self, contract: &ServiceContract) -> DecompositionResult<String> {
        let messages = contract
            .messages
            .iter()
            .map(|m| ProtoMessageView {
                name: m.name.clone(),
                fields: m
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| ProtoFieldView {
                        label: if f.repeated {
                            "repeated ".into()
                        } else if f.optional {
                            "optional ".into()
                        } else {
                            String::new()
                        },
                        ty: Self::scalar(&f.ty),
                        name: f.name.clone(),
                        number: i + 1,
                    })
                    .collect(),
            })
            .collect();
        let rpcs = contract
            .operations
            .iter()
            .map(|op| ProtoRpcView {
                name: op.name.clone(),
                request: op.request.clone(),
                response: op.response.clone(),
            })
            .collect();

        let template = ProtoTemplate {
            package: contract.package.clone(),
            service: contract.service.clone(),
            messages,
            rpcs,
        };
        render(&format!("{}.proto", contract.package), template.render())
    }
}

/// Rust type a protobuf code generator produces for a contract scalar.
pub fn wire_rust_type(ty: &ContractType) -> String {
    match ty {
        ContractType::Int32 => "i32".into(),
        ContractType::Int64 => "i64".into(),
        ContractType::UInt32 => "u32".into(),
        ContractType::Double => "f64".into(),
        ContractType::Bool => "bool".into(),
        ContractType::String | ContractType::Timestamp => "String".into(),
        ContractType::Bytes => "Vec<u8>".into(),
        ContractType::Message(name) => name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_entity;

    fn widget_contract() -> ServiceContract {
        let entity =
            EntityModel::from_entity(&test_entity(1, "Widget"), Identifier::new("Widget")).unwrap();
        ServiceContract::for_entities(&Identifier::new("Inventory"), "shop", &[entity])
    }

    #[test]
    fn test_crud_operations() {
        let contract = widget_contract();
        assert_eq!(contract.package, "shop.inventory");
        assert_eq!(contract.qualified_service(), "shop.inventory.InventoryService");
        let ops: Vec<&str> = contract.operations.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            ops,
            vec!["CreateWidget", "GetWidget", "UpdateWidget", "DeleteWidget", "ListWidget"]
        );
        assert_eq!(contract.messages.len(), 8);
    }

    #[test]
    fn test_proto_rendering() {
        let proto = ProtoRenderer.render(&widget_contract()).unwrap();
        assert!(proto.starts_with("syntax = \"proto3\";"));
        assert!(proto.contains("package shop.inventory;"));
        assert!(proto.contains("service InventoryService {"));
        assert!(proto.contains("rpc CreateWidget(CreateWidgetRequest) returns (Widget);"));
        assert!(proto.contains("int32 id = 1;"));
        assert!(proto.contains("string name = 2;"));
        assert!(proto.contains("repeated Widget items = 1;"));
    }

    #[test]
    fn test_optional_label() {
        let f = ContractField {
            name: "notes".into(),
            ty: ContractType::String,
            optional: true,
            repeated: false,
        };
        let contract = ServiceContract {
            service: "Notes".into(),
            package: "notes".into(),
            messages: vec![ContractMessage {
                name: "Note".into(),
                fields: vec![f],
            }],
            operations: vec![],
        };
        let proto = ProtoRenderer.render(&contract).unwrap();
        assert!(proto.contains("optional string notes = 1;"));
    }
}
