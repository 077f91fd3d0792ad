//! Kubernetes Ingress for raw and multi-node deployments

use super::{
    filter_annotations, filter_labels, namespace_of, non_empty, owner_references, BuildError,
    BuildOutcome, NotReady,
};
use crate::config::IngressConfig;
use crate::controller::ingress::naming::{
    decoder_service_name, engine_service_name, router_service_name, COMMON_ISVC_PORT,
};
use crate::controller::services::DomainService;
use crate::crd::inference_service::{condition_types, InferenceService};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;

pub struct IngressBuilder {
    domain_service: Arc<dyn DomainService>,
}

impl IngressBuilder {
    pub fn new(domain_service: Arc<dyn DomainService>) -> Self {
        Self { domain_service }
    }

    /// Build one Ingress carrying a host rule per reachable component.
    ///
    /// With a router the top-level and router hosts go to the entry service
    /// `<name>`; without one they go to the engine.
    pub fn build(
        &self,
        isvc: &InferenceService,
        config: &IngressConfig,
    ) -> Result<BuildOutcome<Ingress>, BuildError> {
        let name = isvc.metadata.name.clone().unwrap_or_default();
        let namespace = namespace_of(isvc)?;

        let mut rules = Vec::new();
        if isvc.has_router() {
            if !isvc.is_condition_true(condition_types::ROUTES_READY) {
                return Ok(BuildOutcome::NotReady(NotReady::failed(
                    "Router ingress not created",
                )));
            }
            rules.push(self.rule(&name, &name, isvc, config)?);
            rules.push(self.rule(&router_service_name(&name), &name, isvc, config)?);
            rules.push(self.rule(
                &engine_service_name(&name),
                &engine_service_name(&name),
                isvc,
                config,
            )?);
            if isvc.has_decoder() {
                rules.push(self.rule(&decoder_service_name(&name), &name, isvc, config)?);
            }
        } else if isvc.has_decoder() {
            if !isvc.is_condition_true(condition_types::DECODER_READY) {
                return Ok(BuildOutcome::NotReady(NotReady::failed(
                    "Decoder ingress not created",
                )));
            }
            let engine = engine_service_name(&name);
            rules.push(self.rule(&name, &engine, isvc, config)?);
            rules.push(self.rule(&engine, &engine, isvc, config)?);
            let decoder = decoder_service_name(&name);
            rules.push(self.rule(&decoder, &decoder, isvc, config)?);
        } else {
            if !isvc.is_engine_ready() {
                return Ok(BuildOutcome::NotReady(NotReady::failed(
                    "Engine ingress not created",
                )));
            }
            rules.push(self.rule(&name, &engine_service_name(&name), isvc, config)?);
        }

        Ok(BuildOutcome::Ready(Ingress {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.to_string()),
                annotations: non_empty(filter_annotations(isvc)),
                labels: non_empty(filter_labels(isvc)),
                owner_references: owner_references(isvc),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                ingress_class_name: config.ingress_class_name.clone(),
                rules: Some(rules),
                ..Default::default()
            }),
            ..Default::default()
        }))
    }

    /// Rule for the public host of `host_name` routing `/` to `backend`
    fn rule(
        &self,
        host_name: &str,
        backend: &str,
        isvc: &InferenceService,
        config: &IngressConfig,
    ) -> Result<IngressRule, BuildError> {
        let host = self
            .domain_service
            .generate_domain_name(host_name, &isvc.metadata, config)?;

        Ok(IngressRule {
            host: Some(host),
            http: Some(HTTPIngressRuleValue {
                paths: vec![HTTPIngressPath {
                    path: Some("/".to_string()),
                    path_type: "Prefix".to_string(),
                    backend: IngressBackend {
                        service: Some(IngressServiceBackend {
                            name: backend.to_string(),
                            port: Some(ServiceBackendPort {
                                number: Some(COMMON_ISVC_PORT),
                                ..Default::default()
                            }),
                        }),
                        ..Default::default()
                    },
                }],
            }),
        })
    }
}
