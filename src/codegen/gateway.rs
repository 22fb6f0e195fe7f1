//! Gateway artifact set: one routing table covering every service
//! operation, plus UI-facing handlers that forward to it.

use askama::Template;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::artifact::{ArtifactKind, ArtifactOwner, GenerationArtifact, Layer};
use super::service::ServiceBlueprint;
use super::templates::{render, EntityView, UiHandlerTemplate};
use crate::error::DecompositionResult;
use crate::model::ServiceId;

/// Port of the first service; the rest follow in plan order.
pub const FIRST_SERVICE_PORT: u16 = 5001;
pub const GATEWAY_BASE_URL: &str = "http://localhost:5000";
pub const ROUTES_PATH: &str = "gateway/routes.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downstream {
    pub host: String,
    pub port: u16,
    /// Fully qualified RPC method, e.g. `shop.orders.OrdersService/GetOrder`
    pub rpc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRoute {
    pub service: String,
    pub operation: String,
    pub method: String,
    pub upstream_path: String,
    pub downstream: Downstream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRoutes {
    pub base_url: String,
    pub routes: Vec<GatewayRoute>,
}

/// `/api/<service>/<entity>`
fn base_path(service: &ServiceBlueprint, entity: &EntityView) -> String {
    format!("/api/{}/{}", service.ident.kebab(), entity.kebab)
}

pub fn routes_for(blueprints: &BTreeMap<ServiceId, ServiceBlueprint>) -> GatewayRoutes {
    let mut routes = Vec::new();
    for (i, service) in blueprints.values().enumerate() {
        let port = FIRST_SERVICE_PORT + i as u16;
        let qualified = service.contract.qualified_service();
        for op in &service.contract.operations {
            let Some(entity) = service.entities.iter().find(|e| e.ident.pascal() == op.entity)
            else {
                continue;
            };
            let base = base_path(service, &EntityView::from(entity));
            let upstream_path = if op.verb.is_keyed() {
                format!("{}/{{{}}}", base, entity.key().ident.snake())
            } else {
                base
            };
            routes.push(GatewayRoute {
                service: service.ident.kebab().to_string(),
                operation: op.name.clone(),
                method: op.verb.http_method().to_string(),
                upstream_path,
                downstream: Downstream {
                    host: service.ident.kebab().to_string(),
                    port,
                    rpc: format!("{}/{}", qualified, op.name),
                },
            });
        }
    }
    GatewayRoutes {
        base_url: GATEWAY_BASE_URL.to_string(),
        routes,
    }
}

pub fn render_gateway(
    blueprints: &BTreeMap<ServiceId, ServiceBlueprint>,
) -> DecompositionResult<Vec<GenerationArtifact>> {
    let mut artifacts = Vec::new();

    let routes = routes_for(blueprints);
    artifacts.push(GenerationArtifact::new(
        ArtifactOwner::Gateway,
        Layer::Presentation,
        ArtifactKind::GatewayRoutes,
        ROUTES_PATH,
        serde_yaml::to_string(&routes)?,
    ));

    for service in blueprints.values() {
        for entity in &service.entities {
            let view = EntityView::from(entity);
            let path = format!(
                "gateway/src/ui/{}/{}_handlers.rs",
                service.ident.snake(),
                entity.ident.snake()
            );
            let content = render(
                &path,
                UiHandlerTemplate {
                    service: service.ident.pascal().to_string(),
                    base_path: base_path(service, &view),
                    entity: view,
                }
                .render(),
            )?;
            artifacts.push(GenerationArtifact::new(
                ArtifactOwner::Gateway,
                Layer::Presentation,
                ArtifactKind::UiHandler,
                path,
                content,
            ));
        }
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::naming::Identifier;
    use crate::test_helpers::{plan_of, shop_graph};

    fn blueprints() -> BTreeMap<ServiceId, ServiceBlueprint> {
        let graph = shop_graph();
        let plan = plan_of(&graph, &[("Accounts", vec![1, 2]), ("Catalog", vec![3])]);
        plan.services
            .iter()
            .map(|s| {
                let ident = Identifier::new(&s.proposed_name);
                (s.id, ServiceBlueprint::new(&graph, s, ident, "shop").unwrap())
            })
            .collect()
    }

    #[test]
    fn test_one_route_per_operation() {
        let routes = routes_for(&blueprints());
        assert_eq!(routes.routes.len(), 15);

        let get_product = routes
            .routes
            .iter()
            .find(|r| r.operation == "GetProduct")
            .unwrap();
        assert_eq!(get_product.method, "GET");
        assert_eq!(get_product.upstream_path, "/api/catalog/product/{id}");
        assert_eq!(get_product.downstream.port, 5002);
        assert_eq!(get_product.downstream.rpc, "shop.catalog.CatalogService/GetProduct");

        let list_users = routes.routes.iter().find(|r| r.operation == "ListUser").unwrap();
        assert_eq!(list_users.upstream_path, "/api/accounts/user");
        assert_eq!(list_users.downstream.port, 5001);
    }

    #[test]
    fn test_gateway_artifacts() {
        let artifacts = render_gateway(&blueprints()).unwrap();
        assert_eq!(artifacts.len(), 4);
        assert_eq!(artifacts[0].relative_path, ROUTES_PATH);
        let parsed: GatewayRoutes = serde_yaml::from_str(&artifacts[0].content).unwrap();
        assert_eq!(parsed.base_url, GATEWAY_BASE_URL);

        let handler = artifacts
            .iter()
            .find(|a| a.relative_path == "gateway/src/ui/catalog/product_handlers.rs")
            .unwrap();
        assert_eq!(handler.kind, ArtifactKind::UiHandler);
        assert!(handler
            .content
            .contains("format!(\"{}/api/catalog/product/{}\", self.gateway_url, key)"));
    }
}
