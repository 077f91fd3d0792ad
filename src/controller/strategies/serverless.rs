//! Serverless strategy: mesh VirtualService plus an ExternalName service

use super::{
    apply, delete_owned, is_semantic_subset, mark_not_ready, mark_ready, metadata_drifted,
    reasons, record_not_ready, IngressStrategy, StrategyError,
};
use crate::config::{annotations, IngressConfig, DOMAIN_CONFIG_MAP};
use crate::controller::builders::virtual_service::{
    build_external_name_service, component_host, service_host,
};
use crate::controller::builders::{BuildOutcome, NotReady, VirtualServiceBuilder};
use crate::controller::ingress::naming::{default_service_name, service_hostname};
use crate::controller::ingress::Context;
use crate::controller::services::{DomainService, PathService};
use crate::controller::store::StoreError;
use crate::crd::inference_service::{ConditionStatus, InferenceService};
use crate::crd::virtual_service::VirtualService;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ServerlessStrategy {
    config: IngressConfig,
    builder: VirtualServiceBuilder,
    path_service: Arc<dyn PathService>,
}

impl ServerlessStrategy {
    pub fn new(
        config: IngressConfig,
        domain_service: Arc<dyn DomainService>,
        path_service: Arc<dyn PathService>,
    ) -> Self {
        Self {
            config,
            builder: VirtualServiceBuilder::new(domain_service, path_service.clone()),
            path_service,
        }
    }

    /// Remove the VirtualService and ExternalName service this service created
    async fn delete_children(
        &self,
        isvc: &InferenceService,
        ctx: &Context,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        if delete_owned(ctx.stores.virtual_services.as_ref(), isvc, namespace, name).await? {
            info!(isvc = ?name, namespace = %namespace, "Deleted VirtualService");
        }
        if delete_owned(ctx.stores.services.as_ref(), isvc, namespace, name).await? {
            info!(isvc = ?name, namespace = %namespace, "Deleted ExternalName service");
        }
        Ok(())
    }

    /// Public URL: the bare ingress domain plus path when a path template
    /// is set, otherwise the service host
    fn public_url(
        &self,
        name: &str,
        namespace: &str,
        host: &str,
    ) -> Result<String, StrategyError> {
        let scheme = &self.config.url_scheme;
        if self.config.path_template.is_empty() {
            return Ok(format!("{}://{}", scheme, host));
        }
        let path = self
            .path_service
            .generate_url_path(name, namespace, &self.config)
            .map_err(|e| StrategyError::Build(e.into()))?;
        Ok(format!("{}://{}{}", scheme, self.config.ingress_domain, path))
    }
}

/// Serving domains: keys of the domain ConfigMap, empty when it is missing
pub async fn domain_list(ctx: &Context) -> Result<Vec<String>, StoreError> {
    let config_map = ctx
        .stores
        .config_maps
        .get(&ctx.system_namespace, DOMAIN_CONFIG_MAP)
        .await?;
    Ok(config_map
        .and_then(|cm| cm.data)
        .map(|data| data.into_keys().collect())
        .unwrap_or_default())
}

fn is_stopped(isvc: &InferenceService) -> bool {
    isvc.annotations()
        .get(annotations::STOP)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn virtual_service_drifted(desired: &VirtualService, existing: &VirtualService) -> bool {
    desired.spec != existing.spec || metadata_drifted(&desired.metadata, &existing.metadata)
}

fn service_drifted(desired: &Service, existing: &Service) -> bool {
    !is_semantic_subset(&desired.spec, &existing.spec)
}

#[async_trait]
impl IngressStrategy for ServerlessStrategy {
    fn name(&self) -> &'static str {
        "Serverless"
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

        if is_stopped(isvc) {
            self.delete_children(isvc, ctx, &namespace, &name).await?;
            mark_not_ready(
                isvc,
                ctx,
                ConditionStatus::False,
                reasons::STOPPED,
                Some("InferenceService is stopped".to_string()),
            );
            return Ok(());
        }

        let domains = domain_list(ctx).await?;
        let virtual_service = match self.builder.build(isvc, &self.config, &domains)? {
            BuildOutcome::Ready(vs) => vs,
            BuildOutcome::NotReady(not_ready) => {
                record_not_ready(isvc, ctx, not_ready);
                return Ok(());
            }
        };
        let (Some(component), Some(public)) = (component_host(isvc), service_host(isvc)) else {
            record_not_ready(
                isvc,
                ctx,
                NotReady::tracking(ConditionStatus::Unknown, "Component URL not available"),
            );
            return Ok(());
        };

        let (url, address) = if self.config.disable_istio_virtual_host {
            debug!(isvc = ?name, "Mesh virtual host disabled, exposing component URL");
            self.delete_children(isvc, ctx, &namespace, &name).await?;

            let component_kind = if isvc.has_router() { "router" } else { "engine" };
            let target = default_service_name(&name, component_kind);
            (
                format!("{}://{}", self.config.url_scheme, component),
                format!("http://{}", service_hostname(&target, &namespace)),
            )
        } else {
            let service = build_external_name_service(isvc, &self.config)?;
            let applied = apply(ctx.stores.services.as_ref(), service, service_drifted).await?;
            debug!(isvc = ?name, result = ?applied, "ExternalName service reconciled");

            let applied = apply(
                ctx.stores.virtual_services.as_ref(),
                virtual_service,
                virtual_service_drifted,
            )
            .await?;
            info!(isvc = ?name, namespace = %namespace, result = ?applied, "VirtualService reconciled");

            (
                self.public_url(&name, &namespace, &public)?,
                format!("http://{}", service_hostname(&name, &namespace)),
            )
        };

        mark_ready(isvc, ctx, url, address);
        Ok(())
    }
}
