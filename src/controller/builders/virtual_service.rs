//! Mesh VirtualService for serverless services

use super::{
    filter_annotations, filter_labels, namespace_of, non_empty, owner_references, BuildError,
    BuildOutcome, NotReady,
};
use crate::config::IngressConfig;
use crate::controller::ingress::naming::{
    decoder_service_name, engine_service_name, host_regexp, is_cluster_local,
    router_service_name, service_hostname, COMMON_ISVC_PORT, DECODER_PREFIX,
    ISVC_NAMESPACE_HEADER, ISVC_NAME_HEADER, MESH_GATEWAY, PATH_BASED_DECODER_SUFFIX,
};
use crate::controller::services::{DomainService, PathService};
use crate::crd::inference_service::{
    component_keys, condition_types, ConditionStatus, InferenceService,
};
use crate::crd::virtual_service::{
    Destination, HeaderOperations, Headers, HttpMatchRequest, HttpRewrite, HttpRoute,
    HttpRouteDestination, PortSelector, RegexRewrite, StringMatch, VirtualService,
    VirtualServiceSpec,
};
use k8s_openapi::api::core::v1::{Service, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Host of the component URL recorded in status (router when present, else engine)
pub fn component_host(isvc: &InferenceService) -> Option<String> {
    let key = if isvc.has_router() {
        component_keys::ROUTER
    } else {
        component_keys::ENGINE
    };
    let url = isvc.component_url(key)?;
    let uri = url.parse::<http::Uri>().ok()?;
    uri.host().map(String::from)
}

/// Public host of the service: the component host with its component
/// suffix removed, e.g. `m-engine-default.u.example.com` becomes `m.u.example.com`
pub fn service_host(isvc: &InferenceService) -> Option<String> {
    let host = component_host(isvc)?;
    let component = if isvc.has_router() { "router" } else { "engine" };
    let suffix = if host.contains("-default") {
        format!("-{}-default", component)
    } else {
        format!("-{}", component)
    };
    Some(host.replacen(&suffix, "", 1))
}

pub struct VirtualServiceBuilder {
    domain_service: Arc<dyn DomainService>,
    path_service: Arc<dyn PathService>,
}

impl VirtualServiceBuilder {
    pub fn new(domain_service: Arc<dyn DomainService>, path_service: Arc<dyn PathService>) -> Self {
        Self {
            domain_service,
            path_service,
        }
    }

    /// Build the VirtualService for `isvc`.
    ///
    /// `domain_list` holds the serving domains used to derive additional hosts.
    pub fn build(
        &self,
        isvc: &InferenceService,
        config: &IngressConfig,
        domain_list: &[String],
    ) -> Result<BuildOutcome<VirtualService>, BuildError> {
        let name = isvc.metadata.name.clone().unwrap_or_default();
        let namespace = namespace_of(isvc)?;

        let backend = if isvc.has_router() {
            if !isvc.is_condition_true(condition_types::ROUTES_READY) {
                return Ok(BuildOutcome::NotReady(NotReady::tracking(
                    isvc.condition_status(condition_types::ROUTES_READY),
                    "Router ingress not created",
                )));
            }
            router_service_name(&name)
        } else {
            // With or without a decoder the engine is the serverless entrypoint
            if !isvc.is_engine_ready() {
                return Ok(BuildOutcome::NotReady(NotReady::tracking(
                    isvc.engine_condition_status(),
                    "Engine ingress not created",
                )));
            }
            engine_service_name(&name)
        };

        if isvc.has_decoder() && !isvc.is_condition_true(condition_types::DECODER_READY) {
            return Ok(BuildOutcome::NotReady(NotReady::tracking(
                isvc.condition_status(condition_types::DECODER_READY),
                "Decoder ingress not created",
            )));
        }

        let Some(service_host) = service_host(isvc) else {
            debug!(isvc = ?name, "Component URL not reported yet");
            return Ok(BuildOutcome::NotReady(NotReady::tracking(
                ConditionStatus::Unknown,
                "Component URL not available",
            )));
        };

        let internal_host = service_hostname(&name, namespace);
        let internal = is_internal(isvc, &service_host, &internal_host);
        let annotations = filter_annotations(isvc);

        let additional_hosts = if internal {
            Vec::new()
        } else {
            self.domain_service.additional_hosts_with_annotations(
                domain_list,
                &service_host,
                config,
                isvc.metadata.annotations.as_ref().unwrap_or(&BTreeMap::new()),
            )
        };

        let hosts_ctx = RouteHosts {
            config,
            service_host: &service_host,
            internal_host: &internal_host,
            additional_hosts: &additional_hosts,
            internal,
        };

        let mut http = Vec::new();
        if isvc.has_decoder() {
            http.push(HttpRoute {
                match_: hosts_ctx.match_requests(Some(StringMatch::Regex(
                    DECODER_PREFIX.to_string(),
                ))),
                route: vec![destination(config)],
                headers: Some(header_set(&decoder_service_name(&name), &name, namespace)),
                rewrite: None,
            });
        }
        http.push(HttpRoute {
            match_: hosts_ctx.match_requests(None),
            route: vec![destination(config)],
            headers: Some(header_set(&backend, &name, namespace)),
            rewrite: None,
        });

        let mut hosts = vec![internal_host.clone()];
        let mut gateways = vec![config.local_gateway.clone(), MESH_GATEWAY.to_string()];
        if !internal {
            hosts.push(service_host.clone());
            gateways.push(config.ingress_gateway.clone());
        }

        if !config.path_template.is_empty() {
            let (path_routes, path_host) = self.path_routes(isvc, config, &backend)?;
            http.extend(path_routes);
            hosts.push(path_host);
        }

        if !internal {
            for host in additional_hosts {
                if !hosts.contains(&host) {
                    hosts.push(host);
                }
            }
        }

        Ok(BuildOutcome::Ready(VirtualService {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.to_string()),
                annotations: non_empty(annotations),
                labels: non_empty(filter_labels(isvc)),
                owner_references: owner_references(isvc),
                ..Default::default()
            },
            spec: VirtualServiceSpec {
                hosts,
                gateways,
                http,
            },
        }))
    }

    /// Routes serving the service under a URL path of the bare ingress domain
    fn path_routes(
        &self,
        isvc: &InferenceService,
        config: &IngressConfig,
        backend: &str,
    ) -> Result<(Vec<HttpRoute>, String), BuildError> {
        let name = isvc.metadata.name.clone().unwrap_or_default();
        let namespace = namespace_of(isvc)?;
        let path = self
            .path_service
            .generate_url_path(&name, namespace, config)?;
        let path = path.strip_suffix('/').unwrap_or(&path);
        let host = config.ingress_domain.clone();
        let authority = Some(StringMatch::Regex(host_regexp(&host)));
        let gateways = vec![config.ingress_gateway.clone()];

        let mut routes = Vec::new();
        if isvc.has_decoder() {
            let decoder_path = format!("{}{}", path, PATH_BASED_DECODER_SUFFIX);
            routes.push(HttpRoute {
                match_: vec![HttpMatchRequest {
                    uri: Some(StringMatch::Regex(decoder_path.clone())),
                    authority: authority.clone(),
                    gateways: gateways.clone(),
                }],
                route: vec![destination(config)],
                rewrite: Some(HttpRewrite {
                    uri: None,
                    uri_regex_rewrite: Some(RegexRewrite {
                        match_: decoder_path,
                        rewrite: r"\1".to_string(),
                    }),
                }),
                headers: Some(header_set(&decoder_service_name(&name), &name, namespace)),
            });
        }

        routes.push(HttpRoute {
            match_: vec![
                HttpMatchRequest {
                    uri: Some(StringMatch::Prefix(format!("{}/", path))),
                    authority: authority.clone(),
                    gateways: gateways.clone(),
                },
                HttpMatchRequest {
                    uri: Some(StringMatch::Exact(path.to_string())),
                    authority,
                    gateways,
                },
            ],
            route: vec![destination(config)],
            rewrite: Some(HttpRewrite {
                uri: Some("/".to_string()),
                uri_regex_rewrite: None,
            }),
            headers: Some(header_set(backend, &name, namespace)),
        });

        Ok((routes, host))
    }
}

struct RouteHosts<'a> {
    config: &'a IngressConfig,
    service_host: &'a str,
    internal_host: &'a str,
    additional_hosts: &'a [String],
    internal: bool,
}

impl RouteHosts<'_> {
    fn match_requests(&self, uri: Option<StringMatch>) -> Vec<HttpMatchRequest> {
        let mut matches = vec![HttpMatchRequest {
            uri: uri.clone(),
            authority: Some(StringMatch::Regex(host_regexp(self.internal_host))),
            gateways: vec![self.config.local_gateway.clone(), MESH_GATEWAY.to_string()],
        }];
        if self.internal {
            return matches;
        }

        let external = std::iter::once(self.service_host)
            .chain(self.additional_hosts.iter().map(String::as_str));
        for host in external {
            let request = HttpMatchRequest {
                uri: uri.clone(),
                authority: Some(StringMatch::Regex(host_regexp(host))),
                gateways: vec![self.config.ingress_gateway.clone()],
            };
            if !matches.contains(&request) {
                matches.push(request);
            }
        }
        matches
    }
}

/// Cluster-local services only get the in-cluster host
fn is_internal(isvc: &InferenceService, service_host: &str, internal_host: &str) -> bool {
    isvc.metadata
        .labels
        .as_ref()
        .is_some_and(is_cluster_local)
        || service_host == internal_host
}

fn destination(config: &IngressConfig) -> HttpRouteDestination {
    HttpRouteDestination {
        destination: Destination {
            host: config.knative_local_gateway_service.clone(),
            port: Some(PortSelector {
                number: COMMON_ISVC_PORT as u32,
            }),
        },
        weight: 100,
    }
}

fn header_set(backend: &str, name: &str, namespace: &str) -> Headers {
    let mut set = BTreeMap::new();
    set.insert("Host".to_string(), service_hostname(backend, namespace));
    set.insert(ISVC_NAME_HEADER.to_string(), name.to_string());
    set.insert(ISVC_NAMESPACE_HEADER.to_string(), namespace.to_string());
    Headers {
        request: Some(HeaderOperations { set }),
    }
}

/// ExternalName service letting in-cluster clients reach the service by name
pub fn build_external_name_service(
    isvc: &InferenceService,
    config: &IngressConfig,
) -> Result<Service, BuildError> {
    Ok(Service {
        metadata: ObjectMeta {
            name: isvc.metadata.name.clone(),
            namespace: Some(namespace_of(isvc)?.to_string()),
            owner_references: owner_references(isvc),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ExternalName".to_string()),
            external_name: Some(config.local_gateway_service.clone()),
            session_affinity: Some("None".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
#[path = "virtual_service_test.rs"]
mod tests;
