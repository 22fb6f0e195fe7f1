//! Per-service layer renderers.

use askama::Template;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::artifact::{ArtifactKind, ArtifactOwner, GenerationArtifact, Layer};
use super::contract::{wire_rust_type, ContractRenderer, ContractType, ServiceContract};
use super::fields::EntityModel;
use super::naming::{Identifier, NameRegistry};
use super::templates::{
    render, ApplicationServiceTemplate, ClientStubTemplate, DomainEntityTemplate, EntityView,
    RemoteEntityView, RepositoryAdapterTemplate, RepositoryContractTemplate, SqlView,
};
use crate::error::{DecompositionError, DecompositionResult};
use crate::graph::DependencyGraph;
use crate::model::{EntityId, ServiceId};
use crate::plan::MicroserviceCandidate;
use crate::StorageBackend;

/// Everything derived from the plan that rendering one service needs,
/// including what its callers need to know about it.
#[derive(Debug, Clone)]
pub struct ServiceBlueprint {
    pub id: ServiceId,
    pub ident: Identifier,
    pub entities: Vec<EntityModel>,
    pub contract: ServiceContract,
    /// Outbound references: remote service → remote entity → local entity names
    pub outbound: BTreeMap<ServiceId, BTreeMap<EntityId, BTreeSet<String>>>,
}

impl ServiceBlueprint {
    pub fn new(
        graph: &DependencyGraph,
        service: &MicroserviceCandidate,
        ident: Identifier,
        package_prefix: &str,
    ) -> DecompositionResult<Self> {
        let mut names = NameRegistry::new();
        let entities = service
            .member_entity_ids
            .iter()
            .map(|id| {
                let entity = graph
                    .entity(*id)
                    .ok_or_else(|| DecompositionError::unknown_entity(*id))?;
                EntityModel::from_entity(entity, names.claim(&entity.name)?)
            })
            .collect::<DecompositionResult<Vec<_>>>()?;

        let mut outbound: BTreeMap<ServiceId, BTreeMap<EntityId, BTreeSet<String>>> =
            BTreeMap::new();
        for edge in service.outbound_edges() {
            let local = graph
                .entity(edge.local_entity)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| edge.local_entity.to_string());
            outbound
                .entry(edge.remote_service)
                .or_default()
                .entry(edge.remote_entity)
                .or_default()
                .insert(local);
        }

        let contract = ServiceContract::for_entities(&ident, package_prefix, &entities);
        Ok(Self {
            id: service.id,
            ident,
            entities,
            contract,
            outbound,
        })
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityModel> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// `services/<kebab>`
    pub fn root(&self) -> String {
        format!("services/{}", self.ident.kebab())
    }
}

impl StorageBackend {
    fn prefix(&self) -> &'static str {
        match self {
            Self::InMemory => "InMemory",
            Self::Postgres => "Postgres",
            Self::Mysql => "MySql",
        }
    }

    fn pool_type(&self) -> &'static str {
        match self {
            Self::InMemory => "",
            Self::Postgres => "sqlx::PgPool",
            Self::Mysql => "sqlx::MySqlPool",
        }
    }

    fn quote(&self, name: &str) -> String {
        match self {
            // Rendered inside a Rust string literal
            Self::Postgres => format!("\\\"{}\\\"", name),
            Self::Mysql => format!("`{}`", name),
            Self::InMemory => name.to_string(),
        }
    }

    fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${}", n),
            _ => "?".to_string(),
        }
    }
}

/// CRUD statements for one entity table.
fn sql_for(entity: &EntityModel, backend: StorageBackend) -> SqlView {
    if backend == StorageBackend::InMemory {
        return SqlView::default();
    }
    let table = backend.quote(entity.ident.snake());
    let key = backend.quote(entity.key().ident.snake());
    let columns: Vec<String> = entity
        .fields
        .iter()
        .map(|f| backend.quote(f.ident.snake()))
        .collect();
    let column_list = columns.join(", ");
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| backend.placeholder(i)).collect();

    // With no data fields the key is rewritten onto itself.
    let set_fields: Vec<&super::fields::FieldModel> = if entity.data_fields().is_empty() {
        vec![entity.key()]
    } else {
        entity.data_fields().iter().collect()
    };
    let assignments: Vec<String> = set_fields
        .iter()
        .enumerate()
        .map(|(i, f)| {
            format!(
                "{} = {}",
                backend.quote(f.ident.snake()),
                backend.placeholder(i + 1)
            )
        })
        .collect();
    let mut update_binds: Vec<String> = set_fields.iter().map(|f| f.ident.field()).collect();
    update_binds.push(entity.key().ident.field());

    SqlView {
        insert: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            column_list,
            placeholders.join(", ")
        ),
        select: format!(
            "SELECT {} FROM {} WHERE {} = {}",
            column_list,
            table,
            key,
            backend.placeholder(1)
        ),
        update: format!(
            "UPDATE {} SET {} WHERE {} = {}",
            table,
            assignments.join(", "),
            key,
            backend.placeholder(set_fields.len() + 1)
        ),
        update_binds,
        delete: format!("DELETE FROM {} WHERE {} = {}", table, key, backend.placeholder(1)),
        list: format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
            column_list,
            table,
            key,
            backend.placeholder(1),
            backend.placeholder(2)
        ),
    }
}

/// Render every artifact of one service.
pub fn render_service(
    blueprint: &ServiceBlueprint,
    all: &BTreeMap<ServiceId, ServiceBlueprint>,
    backend: StorageBackend,
    renderer: &dyn ContractRenderer,
) -> DecompositionResult<Vec<GenerationArtifact>> {
    let owner = ArtifactOwner::Service(blueprint.id);
    let root = blueprint.root();
    let service_name = blueprint.ident.pascal().to_string();
    let mut artifacts = Vec::new();

    for entity in &blueprint.entities {
        let view = EntityView::from(entity);
        let snake = entity.ident.snake();

        let path = format!("{}/src/domain/{}.rs", root, snake);
        let content = render(
            &path,
            DomainEntityTemplate {
                service: service_name.clone(),
                entity: view.clone(),
            }
            .render(),
        )?;
        artifacts.push(GenerationArtifact::new(
            owner,
            Layer::Domain,
            ArtifactKind::DomainEntity,
            path,
            content,
        ));

        let path = format!("{}/src/repository/{}_repository.rs", root, snake);
        let content = render(&path, RepositoryContractTemplate { entity: view.clone() }.render())?;
        artifacts.push(GenerationArtifact::new(
            owner,
            Layer::Repository,
            ArtifactKind::RepositoryContract,
            path,
            content,
        ));

        let path = format!(
            "{}/src/infrastructure/{}/{}_repository.rs",
            root,
            backend.as_str(),
            snake
        );
        let content = render(
            &path,
            RepositoryAdapterTemplate {
                entity: view.clone(),
                backend_label: backend.prefix().to_string(),
                prefix: backend.prefix().to_string(),
                in_memory: backend == StorageBackend::InMemory,
                pool_type: backend.pool_type().to_string(),
                sql: sql_for(entity, backend),
            }
            .render(),
        )?;
        artifacts.push(GenerationArtifact::new(
            owner,
            Layer::Repository,
            ArtifactKind::RepositoryAdapter,
            path,
            content,
        ));

        let path = format!("{}/src/application/{}_service.rs", root, snake);
        let content = render(&path, ApplicationServiceTemplate { entity: view }.render())?;
        artifacts.push(GenerationArtifact::new(
            owner,
            Layer::Application,
            ArtifactKind::ApplicationService,
            path,
            content,
        ));
    }

    let path = format!("{}/proto/{}.{}", root, blueprint.ident.snake(), renderer.extension());
    artifacts.push(GenerationArtifact::new(
        owner,
        Layer::Presentation,
        ArtifactKind::PresentationContract,
        path,
        renderer.render(&blueprint.contract)?,
    ));

    for (remote_id, referenced) in &blueprint.outbound {
        let remote = all
            .get(remote_id)
            .ok_or_else(|| DecompositionError::unknown_service(*remote_id))?;
        let entities = referenced
            .iter()
            .map(|(entity_id, locals)| {
                let model = remote
                    .entity(*entity_id)
                    .ok_or_else(|| DecompositionError::unknown_entity(*entity_id))?;
                Ok(RemoteEntityView {
                    pascal: model.ident.pascal().to_string(),
                    snake: model.ident.snake().to_string(),
                    key_field: model.key().ident.snake().to_string(),
                    key_type: wire_rust_type(&ContractType::of(&model.key().semantic_type)),
                    referenced_by: locals.iter().cloned().collect::<Vec<_>>().join(", "),
                })
            })
            .collect::<DecompositionResult<Vec<_>>>()?;

        let path = format!("{}/src/clients/{}_client.rs", root, remote.ident.snake());
        let content = render(
            &path,
            ClientStubTemplate {
                service: service_name.clone(),
                remote: remote.ident.pascal().to_string(),
                remote_snake: remote.ident.snake().to_string(),
                remote_package: remote.contract.package.clone(),
                entities,
            }
            .render(),
        )?;
        artifacts.push(GenerationArtifact::new(
            owner,
            Layer::Application,
            ArtifactKind::ClientStub,
            path,
            content,
        ));
    }

    debug!(
        service = %blueprint.id,
        name = %service_name,
        artifacts = artifacts.len(),
        "Service rendered"
    );
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::contract::ProtoRenderer;
    use crate::test_helpers::{plan_of, shop_graph};

    fn blueprints(backend_prefix: &str) -> BTreeMap<ServiceId, ServiceBlueprint> {
        let graph = shop_graph();
        let plan = plan_of(&graph, &[("Accounts", vec![1, 2]), ("Catalog", vec![3])]);
        plan.services
            .iter()
            .map(|s| {
                let ident = Identifier::new(&s.proposed_name);
                let bp = ServiceBlueprint::new(&graph, s, ident, backend_prefix).unwrap();
                (s.id, bp)
            })
            .collect()
    }

    #[test]
    fn test_outbound_references_become_client_stubs() {
        let all = blueprints("shop");
        let accounts = &all[&ServiceId(1)];
        assert_eq!(accounts.outbound.len(), 1);

        let artifacts =
            render_service(accounts, &all, StorageBackend::Postgres, &ProtoRenderer).unwrap();
        let stub = artifacts
            .iter()
            .find(|a| a.kind == ArtifactKind::ClientStub)
            .unwrap();
        assert_eq!(stub.relative_path, "services/accounts/src/clients/catalog_client.rs");
        assert!(stub.content.contains("pub struct CatalogClient {"));
        assert!(stub.content.contains("pub async fn get_product(&mut self, key: i32)"));
        assert!(stub.content.contains("Referenced by Order."));

        // Catalog is only referenced, so it calls nobody.
        let catalog = &all[&ServiceId(2)];
        let catalog =
            render_service(catalog, &all, StorageBackend::Postgres, &ProtoRenderer).unwrap();
        assert!(catalog.iter().all(|a| a.kind != ArtifactKind::ClientStub));
    }

    #[test]
    fn test_layer_paths() {
        let all = blueprints("shop");
        let catalog = &all[&ServiceId(2)];
        let artifacts =
            render_service(catalog, &all, StorageBackend::InMemory, &ProtoRenderer).unwrap();
        let paths: Vec<&str> = artifacts.iter().map(|a| a.relative_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "services/catalog/src/domain/product.rs",
                "services/catalog/src/repository/product_repository.rs",
                "services/catalog/src/infrastructure/in_memory/product_repository.rs",
                "services/catalog/src/application/product_service.rs",
                "services/catalog/proto/catalog.proto",
            ]
        );
        assert!(artifacts[2].content.contains("pub struct InMemoryProductRepository {"));
    }

    #[test]
    fn test_domain_entity_markers() {
        let all = blueprints("shop");
        let catalog = &all[&ServiceId(2)];
        let artifacts =
            render_service(catalog, &all, StorageBackend::Postgres, &ProtoRenderer).unwrap();
        let domain = &artifacts[0].content;
        assert!(domain.contains("pub struct Product {"));
        assert!(domain.contains("/// key\n    pub id: i32,"));
        assert!(domain.contains("/// required, max length 100\n    pub name: String,"));
        assert!(domain.contains("if self.name.chars().count() > 100 {"));
    }

    #[test]
    fn test_sql_statements() {
        let all = blueprints("shop");
        let product = &all[&ServiceId(2)].entities[0];

        let pg = sql_for(product, StorageBackend::Postgres);
        assert_eq!(
            pg.insert,
            "INSERT INTO \\\"product\\\" (\\\"id\\\", \\\"name\\\") VALUES ($1, $2)"
        );
        assert_eq!(pg.update, "UPDATE \\\"product\\\" SET \\\"name\\\" = $1 WHERE \\\"id\\\" = $2");
        assert_eq!(pg.update_binds, vec!["name", "id"]);

        let my = sql_for(product, StorageBackend::Mysql);
        assert_eq!(my.list, "SELECT `id`, `name` FROM `product` ORDER BY `id` LIMIT ? OFFSET ?");
    }
}
