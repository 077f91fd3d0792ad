//! Gateway API strategy: one HTTPRoute per component plus a top-level route

use super::{
    mark_not_ready, mark_ready, metadata_drifted, reasons, Applied, IngressStrategy,
    StrategyError,
};
use crate::config::IngressConfig;
use crate::controller::builders::{BuildOutcome, HttpRouteBuilder, RouteComponent};
use crate::controller::ingress::naming::{
    engine_service_name, router_service_name, service_hostname, COMMON_ISVC_PORT,
};
use crate::controller::ingress::Context;
use crate::controller::services::{DomainService, PathService};
use crate::controller::store::StoreError;
use crate::crd::inference_service::{ConditionStatus, InferenceService};
use async_trait::async_trait;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct GatewayApiStrategy {
    config: IngressConfig,
    builder: HttpRouteBuilder,
    domain_service: Arc<dyn DomainService>,
}

impl GatewayApiStrategy {
    pub fn new(
        config: IngressConfig,
        domain_service: Arc<dyn DomainService>,
        path_service: Arc<dyn PathService>,
    ) -> Self {
        Self {
            config,
            builder: HttpRouteBuilder::new(domain_service.clone(), path_service),
            domain_service,
        }
    }

    /// Create the route, or dry-run the update so server defaults are
    /// filled in before comparing, then update only on a real difference.
    async fn apply_route(&self, ctx: &Context, mut route: HTTPRoute) -> Result<Applied, StoreError> {
        let store = ctx.stores.http_routes.as_ref();
        let namespace = route.metadata.namespace.clone().unwrap_or_default();
        let name = route.metadata.name.clone().unwrap_or_default();

        let Some(existing) = store.get(&namespace, &name).await? else {
            store.create(&route).await?;
            return Ok(Applied::Created);
        };

        route.metadata.resource_version = existing.metadata.resource_version.clone();
        let defaulted = store.replace(&route, true).await?;
        let same_spec = serde_json::to_value(&defaulted.spec).ok()
            == serde_json::to_value(&existing.spec).ok();
        if same_spec && !metadata_drifted(&route.metadata, &existing.metadata)
        {
            return Ok(Applied::Unchanged);
        }
        store.replace(&route, false).await?;
        Ok(Applied::Updated)
    }

    /// Port of the entry Service, or the common port when it cannot be read
    async fn target_port(&self, ctx: &Context, namespace: &str, service: &str) -> i32 {
        match ctx.stores.services.get(namespace, service).await {
            Ok(Some(svc)) => svc
                .spec
                .and_then(|spec| spec.ports)
                .and_then(|ports| ports.first().map(|p| p.port))
                .unwrap_or(COMMON_ISVC_PORT),
            Ok(None) => COMMON_ISVC_PORT,
            Err(e) => {
                warn!(service = %service, error = %e, "Failed to read target service port, using default");
                COMMON_ISVC_PORT
            }
        }
    }
}

/// First failing parent condition as (reason, message); a route with no
/// parent status is not ready either
pub fn route_not_ready(route: Option<&HTTPRoute>) -> Option<(String, String)> {
    let parents = route
        .and_then(|r| r.status.as_ref())
        .map(|status| status.parents.as_slice())
        .unwrap_or_default();

    if parents.is_empty() {
        return Some((
            reasons::PARENT_STATUS_NOT_AVAILABLE.to_string(),
            reasons::HTTP_ROUTE_NOT_READY.to_string(),
        ));
    }

    parents
        .iter()
        .flat_map(|parent| parent.conditions.iter())
        .find(|condition| condition.status == "False")
        .map(|condition| (condition.reason.clone(), condition.message.clone()))
}

#[async_trait]
impl IngressStrategy for GatewayApiStrategy {
    fn name(&self) -> &'static str {
        "GatewayAPI"
    }

    async fn reconcile(
        &self,
        isvc: &mut InferenceService,
        ctx: &Context,
    ) -> Result<(), StrategyError> {
        let name = isvc
            .metadata
            .name
            .clone()
            .ok_or(StrategyError::MissingField("metadata.name"))?;
        let namespace = isvc
            .metadata
            .namespace
            .clone()
            .ok_or(StrategyError::MissingField("metadata.namespace"))?;

        let mut components = vec![RouteComponent::Engine];
        if isvc.has_router() {
            components.push(RouteComponent::Router);
        }
        if isvc.has_decoder() {
            components.push(RouteComponent::Decoder);
        }
        components.push(RouteComponent::TopLevel);

        for component in &components {
            match self.builder.build(isvc, &self.config, *component)? {
                BuildOutcome::Ready(route) => {
                    let applied = self.apply_route(ctx, route).await?;
                    debug!(isvc = ?name, component = %component, result = ?applied, "HTTPRoute reconciled");
                }
                BuildOutcome::NotReady(not_ready) => {
                    info!(isvc = ?name, component = %component, reason = %not_ready.reason, "HTTPRoute not created");
                    mark_not_ready(
                        isvc,
                        ctx,
                        ConditionStatus::False,
                        &not_ready.reason,
                        Some(format!(
                            "{} component not ready for HTTPRoute creation",
                            component
                        )),
                    );
                    return Ok(());
                }
            }
        }

        for component in &components {
            let route = ctx
                .stores
                .http_routes
                .get(&namespace, &component.route_name(&name))
                .await?;
            if let Some((reason, message)) = route_not_ready(route.as_ref()) {
                debug!(isvc = ?name, component = %component, reason = %reason, "HTTPRoute not accepted yet");
                mark_not_ready(
                    isvc,
                    ctx,
                    ConditionStatus::False,
                    &reason,
                    Some(format!("{} {}", component.label(), message)),
                );
                return Ok(());
            }
        }

        let entry_service = if isvc.has_router() {
            router_service_name(&name)
        } else {
            engine_service_name(&name)
        };
        let port = self.target_port(ctx, &namespace, &entry_service).await;
        let host = self
            .domain_service
            .generate_domain_name(&name, &isvc.metadata, &self.config)
            .map_err(|e| StrategyError::Build(e.into()))?;

        let scheme = &self.config.url_scheme;
        mark_ready(
            isvc,
            ctx,
            format!("{}://{}:{}", scheme, host, port),
            format!(
                "{}://{}:{}",
                scheme,
                service_hostname(&entry_service, &namespace),
                port
            ),
        );
        info!(isvc = ?name, namespace = %namespace, "HTTPRoutes ready");
        Ok(())
    }
}
