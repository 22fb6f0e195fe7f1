//! Askama template definitions for generated artifacts.
//!
//! Templates live under `templates/` at the crate root. Views hold
//! pre-derived identifiers only; no case conversion happens in a template.

use askama::Template;

use super::fields::{EntityModel, FieldModel};
use crate::error::{DecompositionError, DecompositionResult};

/// Map an askama result onto the domain error and normalize the trailing
/// newline.
pub fn render(artifact: &str, result: askama::Result<String>) -> DecompositionResult<String> {
    let mut content = result.map_err(|e| DecompositionError::Template {
        artifact: artifact.to_string(),
        message: e.to_string(),
    })?;
    if !content.ends_with('\n') {
        content.push('\n');
    }
    Ok(content)
}

// ============================================
// Shared views
// ============================================

#[derive(Debug, Clone)]
pub struct FieldView {
    /// Rust field name
    pub name: String,
    /// Storage column / wire name
    pub column: String,
    pub rust_type: String,
    pub optional: bool,
    pub marker: String,
}

impl From<&FieldModel> for FieldView {
    fn from(field: &FieldModel) -> Self {
        let mut marker = if field.key {
            "key".to_string()
        } else if field.optional {
            "optional".to_string()
        } else {
            "required".to_string()
        };
        if let Some(n) = field.max_length {
            marker.push_str(&format!(", max length {}", n));
        }
        Self {
            name: field.ident.field(),
            column: field.ident.snake().to_string(),
            rust_type: field.rust_type(),
            optional: field.optional,
            marker,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LengthCheckView {
    pub name: String,
    pub optional: bool,
    pub max: u32,
}

#[derive(Debug, Clone)]
pub struct EntityView {
    pub pascal: String,
    pub snake: String,
    pub kebab: String,
    pub key: FieldView,
    pub fields: Vec<FieldView>,
    pub data_fields: Vec<FieldView>,
    pub length_checks: Vec<LengthCheckView>,
}

impl From<&EntityModel> for EntityView {
    fn from(model: &EntityModel) -> Self {
        Self {
            pascal: model.ident.pascal().to_string(),
            snake: model.ident.snake().to_string(),
            kebab: model.ident.kebab().to_string(),
            key: FieldView::from(model.key()),
            fields: model.fields.iter().map(FieldView::from).collect(),
            data_fields: model.data_fields().iter().map(FieldView::from).collect(),
            length_checks: model
                .fields
                .iter()
                .filter(|f| f.is_text())
                .filter_map(|f| {
                    f.max_length.map(|max| LengthCheckView {
                        name: f.ident.field(),
                        optional: f.optional,
                        max,
                    })
                })
                .collect(),
        }
    }
}

// ============================================
// Service layers
// ============================================

#[derive(Template)]
#[template(path = "domain_entity.rs.txt", escape = "none")]
pub struct DomainEntityTemplate {
    pub service: String,
    pub entity: EntityView,
}

#[derive(Template)]
#[template(path = "repository_contract.rs.txt", escape = "none")]
pub struct RepositoryContractTemplate {
    pub entity: EntityView,
}

/// Pre-built statements for SQL adapters.
#[derive(Debug, Clone, Default)]
pub struct SqlView {
    pub insert: String,
    pub select: String,
    pub update: String,
    /// Field names bound to `update`, in placeholder order
    pub update_binds: Vec<String>,
    pub delete: String,
    pub list: String,
}

#[derive(Template)]
#[template(path = "repository_adapter.rs.txt", escape = "none")]
pub struct RepositoryAdapterTemplate {
    pub entity: EntityView,
    pub backend_label: String,
    /// Type name prefix, e.g. `Postgres`
    pub prefix: String,
    pub in_memory: bool,
    pub pool_type: String,
    pub sql: SqlView,
}

#[derive(Template)]
#[template(path = "application_service.rs.txt", escape = "none")]
pub struct ApplicationServiceTemplate {
    pub entity: EntityView,
}

#[derive(Debug, Clone)]
pub struct RemoteEntityView {
    pub pascal: String,
    pub snake: String,
    pub key_field: String,
    pub key_type: String,
    /// Local entities holding the reference, comma separated
    pub referenced_by: String,
}

#[derive(Template)]
#[template(path = "client_stub.rs.txt", escape = "none")]
pub struct ClientStubTemplate {
    pub service: String,
    pub remote: String,
    pub remote_snake: String,
    pub remote_package: String,
    pub entities: Vec<RemoteEntityView>,
}

// ============================================
// Contract
// ============================================

#[derive(Debug, Clone)]
pub struct ProtoFieldView {
    /// `repeated ` / `optional ` / empty
    pub label: String,
    pub ty: String,
    pub name: String,
    pub number: usize,
}

#[derive(Debug, Clone)]
pub struct ProtoMessageView {
    pub name: String,
    pub fields: Vec<ProtoFieldView>,
}

#[derive(Debug, Clone)]
pub struct ProtoRpcView {
    pub name: String,
    pub request: String,
    pub response: String,
}

#[derive(Template)]
#[template(path = "service.proto.txt", escape = "none")]
pub struct ProtoTemplate {
    pub package: String,
    pub service: String,
    pub messages: Vec<ProtoMessageView>,
    pub rpcs: Vec<ProtoRpcView>,
}

// ============================================
// Gateway
// ============================================

#[derive(Template)]
#[template(path = "ui_handler.rs.txt", escape = "none")]
pub struct UiHandlerTemplate {
    pub service: String,
    pub entity: EntityView,
    pub base_path: String,
}
