//! Kubernetes Ingress strategy for raw and multi-node deployments

use super::{
    apply, mark_ready, metadata_drifted, record_not_ready, IngressStrategy, StrategyError,
};
use crate::config::IngressConfig;
use crate::controller::builders::{BuildOutcome, IngressBuilder};
use crate::controller::ingress::naming::{
    engine_service_name, is_cluster_local, service_hostname, CLUSTER_LOCAL_DOMAIN,
};
use crate::controller::ingress::Context;
use crate::controller::services::DomainService;
use crate::crd::inference_service::InferenceService;
use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use std::sync::Arc;
use tracing::{debug, info};

pub struct KubeIngressStrategy {
    config: IngressConfig,
    builder: IngressBuilder,
    domain_service: Arc<dyn DomainService>,
}

impl KubeIngressStrategy {
    pub fn new(config: IngressConfig, domain_service: Arc<dyn DomainService>) -> Self {
        Self {
            config,
            builder: IngressBuilder::new(domain_service.clone()),
            domain_service,
        }
    }

    /// Cluster-local services get no Ingress
    fn is_internal(&self, isvc: &InferenceService) -> bool {
        isvc.metadata
            .labels
            .as_ref()
            .is_some_and(is_cluster_local)
            || self.config.ingress_domain == CLUSTER_LOCAL_DOMAIN
    }
}

/// Any spec difference counts, including fields added out of band
fn ingress_drifted(desired: &Ingress, existing: &Ingress) -> bool {
    desired.spec != existing.spec
        || metadata_drifted(&desired.metadata, &existing.metadata)
}

#[async_trait]
impl IngressStrategy for KubeIngressStrategy {
    fn name(&self) -> &'static str {
        "KubernetesIngress"
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

        let ingress = match self.builder.build(isvc, &self.config)? {
            BuildOutcome::Ready(ingress) => ingress,
            BuildOutcome::NotReady(not_ready) => {
                record_not_ready(isvc, ctx, not_ready);
                return Ok(());
            }
        };

        // The router is reached through the entry service, the engine directly
        let entry_service = if isvc.has_router() {
            name.clone()
        } else {
            engine_service_name(&name)
        };
        let address = format!(
            "{}://{}",
            self.config.url_scheme,
            service_hostname(&entry_service, &namespace)
        );

        let url = if self.is_internal(isvc) {
            debug!(isvc = ?name, "Cluster-local service, skipping Ingress");
            format!(
                "{}://{}",
                self.config.url_scheme,
                service_hostname(&name, &namespace)
            )
        } else {
            let applied = apply(ctx.stores.ingresses.as_ref(), ingress, ingress_drifted).await?;
            info!(isvc = ?name, namespace = %namespace, result = ?applied, "Ingress reconciled");

            let host = self
                .domain_service
                .generate_domain_name(&name, &isvc.metadata, &self.config)
                .map_err(|e| StrategyError::Build(e.into()))?;
            format!("{}://{}", self.config.url_scheme, host)
        };

        mark_ready(isvc, ctx, url, address);
        Ok(())
    }
}
