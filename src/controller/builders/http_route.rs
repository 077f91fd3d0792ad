//! Gateway API HTTPRoutes for raw and multi-node deployments
//!
//! One route per present component (engine, router, decoder) plus a
//! top-level route for the service's own hostname.

use super::{
    filter_annotations, filter_labels, namespace_of, non_empty, owner_references, BuildError,
    BuildOutcome, NotReady,
};
use crate::config::IngressConfig;
use crate::controller::ingress::naming::{
    decoder_service_name, engine_service_name, router_service_name, COMMON_ISVC_PORT,
    DECODER_PREFIX, FALLBACK_PREFIX, ISVC_NAMESPACE_HEADER, ISVC_NAME_HEADER,
    PATH_BASED_DECODER_SUFFIX,
};
use crate::controller::services::{DomainService, PathService};
use crate::crd::inference_service::{condition_types, ComponentSpec, InferenceService};
use gateway_api::apis::standard::httproutes::{
    HTTPRoute, HTTPRouteParentRefs, HTTPRouteRules, HTTPRouteRulesBackendRefs,
    HTTPRouteRulesFilters, HTTPRouteRulesFiltersRequestHeaderModifier,
    HTTPRouteRulesFiltersRequestHeaderModifierSet, HTTPRouteRulesFiltersType,
    HTTPRouteRulesMatches, HTTPRouteRulesMatchesPath, HTTPRouteRulesMatchesPathType,
    HTTPRouteRulesTimeouts, HTTPRouteSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Request timeout applied when the component spec sets none
pub const DEFAULT_TIMEOUT_SECONDS: i64 = 60;

const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";
const GATEWAY_KIND: &str = "Gateway";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteComponent {
    Engine,
    Router,
    Decoder,
    TopLevel,
}

impl RouteComponent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteComponent::Engine => "engine",
            RouteComponent::Router => "router",
            RouteComponent::Decoder => "decoder",
            RouteComponent::TopLevel => "toplevel",
        }
    }

    /// Capitalised form used in condition messages
    pub fn label(&self) -> &'static str {
        match self {
            RouteComponent::Engine => "Engine",
            RouteComponent::Router => "Router",
            RouteComponent::Decoder => "Decoder",
            RouteComponent::TopLevel => "TopLevel",
        }
    }

    /// Name of the HTTPRoute emitted for this component
    pub fn route_name(&self, isvc_name: &str) -> String {
        match self {
            RouteComponent::Engine => engine_service_name(isvc_name),
            RouteComponent::Router => router_service_name(isvc_name),
            RouteComponent::Decoder => decoder_service_name(isvc_name),
            RouteComponent::TopLevel => isvc_name.to_string(),
        }
    }
}

impl fmt::Display for RouteComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct HttpRouteBuilder {
    domain_service: Arc<dyn DomainService>,
    path_service: Arc<dyn PathService>,
}

impl HttpRouteBuilder {
    pub fn new(domain_service: Arc<dyn DomainService>, path_service: Arc<dyn PathService>) -> Self {
        Self {
            domain_service,
            path_service,
        }
    }

    pub fn build(
        &self,
        isvc: &InferenceService,
        config: &IngressConfig,
        component: RouteComponent,
    ) -> Result<BuildOutcome<HTTPRoute>, BuildError> {
        match component {
            RouteComponent::Engine => self.build_component(
                isvc,
                config,
                component,
                isvc.is_engine_ready(),
                "Engine ingress not created",
                isvc.engine_spec(),
            ),
            RouteComponent::Router => self.build_component(
                isvc,
                config,
                component,
                isvc.is_condition_true(condition_types::ROUTES_READY),
                "Router ingress not created",
                isvc.spec.router.as_ref(),
            ),
            RouteComponent::Decoder => self.build_component(
                isvc,
                config,
                component,
                isvc.is_condition_true(condition_types::DECODER_READY),
                "Decoder ingress not created",
                isvc.spec.decoder.as_ref(),
            ),
            RouteComponent::TopLevel => self.build_top_level(isvc, config),
        }
    }

    /// Route for one component's own hostname
    fn build_component(
        &self,
        isvc: &InferenceService,
        config: &IngressConfig,
        component: RouteComponent,
        ready: bool,
        not_ready_reason: &str,
        spec: Option<&ComponentSpec>,
    ) -> Result<BuildOutcome<HTTPRoute>, BuildError> {
        if !ready {
            return Ok(BuildOutcome::NotReady(NotReady::failed(not_ready_reason)));
        }

        let name = isvc.metadata.name.clone().unwrap_or_default();
        let namespace = namespace_of(isvc)?;
        let service = component.route_name(&name);
        let host = self
            .domain_service
            .generate_domain_name(&service, &isvc.metadata, config)?;

        let rules = vec![rule(FALLBACK_PREFIX, &service, &name, namespace, spec)];
        Ok(BuildOutcome::Ready(route_resource(
            isvc,
            config,
            service.clone(),
            vec![host],
            rules,
        )?))
    }

    /// Route for the service's public hostname, fronting the entrypoint
    fn build_top_level(
        &self,
        isvc: &InferenceService,
        config: &IngressConfig,
    ) -> Result<BuildOutcome<HTTPRoute>, BuildError> {
        if !isvc.is_engine_ready() {
            return Ok(BuildOutcome::NotReady(NotReady::failed(
                "Engine ingress not created",
            )));
        }
        if isvc.has_decoder() && !isvc.is_condition_true(condition_types::DECODER_READY) {
            return Ok(BuildOutcome::NotReady(NotReady::failed(
                "Decoder ingress not created",
            )));
        }
        if isvc.has_router() && !isvc.is_condition_true(condition_types::ROUTES_READY) {
            return Ok(BuildOutcome::NotReady(NotReady::failed(
                "Router ingress not created",
            )));
        }

        let name = isvc.metadata.name.clone().unwrap_or_default();
        let namespace = namespace_of(isvc)?;
        let top_host = self
            .domain_service
            .generate_domain_name(&name, &isvc.metadata, config)?;

        let mut hostnames = vec![top_host.clone()];
        let additional = self.domain_service.additional_hosts_with_annotations(
            &[config.ingress_domain.clone()],
            &top_host,
            config,
            isvc.metadata.annotations.as_ref().unwrap_or(&BTreeMap::new()),
        );
        for host in additional {
            if !hostnames.contains(&host) {
                hostnames.push(host);
            }
        }

        let (entry_service, entry_spec) = match isvc.spec.router.as_ref() {
            Some(router) => (router_service_name(&name), Some(router)),
            None => (engine_service_name(&name), isvc.engine_spec()),
        };
        let decoder = isvc
            .spec
            .decoder
            .as_ref()
            .map(|spec| (decoder_service_name(&name), spec));

        let mut rules = Vec::new();
        if let Some((decoder_service, decoder_spec)) = &decoder {
            rules.push(rule(
                DECODER_PREFIX,
                decoder_service,
                &name,
                namespace,
                Some(decoder_spec),
            ));
        }
        rules.push(rule(FALLBACK_PREFIX, &entry_service, &name, namespace, entry_spec));

        if !config.path_template.is_empty() {
            let path = self
                .path_service
                .generate_url_path(&name, namespace, config)?;
            let path = path.strip_suffix('/').unwrap_or(&path);
            hostnames.push(config.ingress_domain.clone());

            if let Some((decoder_service, decoder_spec)) = &decoder {
                rules.push(rule(
                    &format!("{}{}", path, PATH_BASED_DECODER_SUFFIX),
                    decoder_service,
                    &name,
                    namespace,
                    Some(decoder_spec),
                ));
            }
            rules.push(rule(
                &format!("{}/", path),
                &entry_service,
                &name,
                namespace,
                entry_spec,
            ));
        }

        Ok(BuildOutcome::Ready(route_resource(
            isvc, config, name, hostnames, rules,
        )?))
    }
}

/// Request timeout; a non-positive override falls back to the default
fn timeout(spec: Option<&ComponentSpec>) -> String {
    let seconds = spec
        .and_then(|s| s.timeout_seconds)
        .filter(|seconds| *seconds > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
    format!("{}s", seconds)
}

/// Regex-matched rule forwarding to `service` with the isvc headers set
fn rule(
    path_regex: &str,
    service: &str,
    isvc_name: &str,
    namespace: &str,
    spec: Option<&ComponentSpec>,
) -> HTTPRouteRules {
    HTTPRouteRules {
        name: None,
        matches: Some(vec![HTTPRouteRulesMatches {
            path: Some(HTTPRouteRulesMatchesPath {
                r#type: Some(HTTPRouteRulesMatchesPathType::RegularExpression),
                value: Some(path_regex.to_string()),
            }),
            ..Default::default()
        }]),
        backend_refs: Some(vec![HTTPRouteRulesBackendRefs {
            name: service.to_string(),
            port: Some(COMMON_ISVC_PORT),
            weight: None,
            kind: Some("Service".to_string()),
            group: Some(String::new()),
            namespace: Some(namespace.to_string()),
            filters: None,
        }]),
        filters: Some(vec![isvc_headers(isvc_name, namespace)]),
        timeouts: Some(HTTPRouteRulesTimeouts {
            request: Some(timeout(spec)),
            ..Default::default()
        }),
    }
}

fn isvc_headers(name: &str, namespace: &str) -> HTTPRouteRulesFilters {
    HTTPRouteRulesFilters {
        r#type: HTTPRouteRulesFiltersType::RequestHeaderModifier,
        request_header_modifier: Some(HTTPRouteRulesFiltersRequestHeaderModifier {
            set: Some(vec![
                HTTPRouteRulesFiltersRequestHeaderModifierSet {
                    name: ISVC_NAME_HEADER.to_string(),
                    value: name.to_string(),
                },
                HTTPRouteRulesFiltersRequestHeaderModifierSet {
                    name: ISVC_NAMESPACE_HEADER.to_string(),
                    value: namespace.to_string(),
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Split a `<namespace>/<name>` gateway reference
pub fn parse_gateway_ref(gateway: &str) -> Result<(String, String), BuildError> {
    match gateway.split_once('/') {
        Some((namespace, name))
            if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((namespace.to_string(), name.to_string()))
        }
        _ => Err(BuildError::InvalidGatewayRef(gateway.to_string())),
    }
}

fn route_resource(
    isvc: &InferenceService,
    config: &IngressConfig,
    name: String,
    hostnames: Vec<String>,
    rules: Vec<HTTPRouteRules>,
) -> Result<HTTPRoute, BuildError> {
    let (gateway_namespace, gateway_name) = parse_gateway_ref(&config.ome_ingress_gateway)?;

    Ok(HTTPRoute {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace_of(isvc)?.to_string()),
            annotations: non_empty(filter_annotations(isvc)),
            labels: non_empty(filter_labels(isvc)),
            owner_references: owner_references(isvc),
            ..Default::default()
        },
        spec: HTTPRouteSpec {
            parent_refs: Some(vec![HTTPRouteParentRefs {
                group: Some(GATEWAY_API_GROUP.to_string()),
                kind: Some(GATEWAY_KIND.to_string()),
                name: gateway_name,
                namespace: Some(gateway_namespace),
                port: None,
                section_name: None,
            }]),
            hostnames: Some(hostnames),
            rules: Some(rules),
            ..Default::default()
        },
        status: None,
    })
}

#[cfg(test)]
#[path = "http_route_test.rs"]
mod tests;
