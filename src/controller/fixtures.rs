//! InferenceService and config fixtures shared by controller tests
#![allow(clippy::unwrap_used)]

use crate::config::{IngressConfig, DEFAULT_DOMAIN_TEMPLATE};
use crate::crd::inference_service::{
    ComponentSpec, ComponentStatus, Condition, ConditionStatus, InferenceService,
    InferenceServiceSpec,
};
use gateway_api::apis::standard::httproutes::{
    HTTPRoute, HTTPRouteStatus, HTTPRouteStatusParents, HTTPRouteStatusParentsParentRef,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition as MetaCondition, Time};

pub const LOCAL_GATEWAY: &str = "knative-serving/knative-local-gateway";
pub const INGRESS_GATEWAY: &str = "ome/ingress-gateway";
pub const LOCAL_GATEWAY_SERVICE: &str = "knative-local-gateway.istio-system.svc.cluster.local";

pub fn config() -> IngressConfig {
    IngressConfig {
        ingress_gateway: INGRESS_GATEWAY.to_string(),
        ingress_service: "istio-ingressgateway.istio-system.svc.cluster.local".to_string(),
        local_gateway: LOCAL_GATEWAY.to_string(),
        local_gateway_service: LOCAL_GATEWAY_SERVICE.to_string(),
        knative_local_gateway_service: LOCAL_GATEWAY_SERVICE.to_string(),
        ome_ingress_gateway: "ome/ome-gateway".to_string(),
        ingress_domain: "example.com".to_string(),
        ingress_class_name: Some("istio".to_string()),
        domain_template: DEFAULT_DOMAIN_TEMPLATE.to_string(),
        url_scheme: "http".to_string(),
        ..Default::default()
    }
}

pub fn component() -> Option<ComponentSpec> {
    Some(ComponentSpec {
        min_replicas: Some(1),
        ..Default::default()
    })
}

/// InferenceService `u/m` with the given spec and a uid for owner references
pub fn isvc(spec: InferenceServiceSpec) -> InferenceService {
    let mut isvc = InferenceService::new("m", spec);
    isvc.metadata.namespace = Some("u".to_string());
    isvc.metadata.uid = Some("6f0c3f2e-0000-4000-8000-000000000001".to_string());
    isvc
}

pub fn engine_only() -> InferenceService {
    isvc(InferenceServiceSpec {
        engine: component(),
        ..Default::default()
    })
}

pub fn with_decoder() -> InferenceService {
    isvc(InferenceServiceSpec {
        engine: component(),
        decoder: component(),
        ..Default::default()
    })
}

pub fn with_router() -> InferenceService {
    isvc(InferenceServiceSpec {
        engine: component(),
        router: component(),
        ..Default::default()
    })
}

pub fn with_router_and_decoder() -> InferenceService {
    isvc(InferenceServiceSpec {
        engine: component(),
        router: component(),
        decoder: component(),
        ..Default::default()
    })
}

pub fn set_condition(isvc: &mut InferenceService, type_: &str, status: ConditionStatus) {
    isvc.set_condition(Condition::new(type_, status), "2026-01-01T00:00:00Z");
}

/// Mark every listed condition True
pub fn ready(mut isvc: InferenceService, types: &[&str]) -> InferenceService {
    for type_ in types {
        set_condition(&mut isvc, type_, ConditionStatus::True);
    }
    isvc
}

pub fn with_component_url(mut isvc: InferenceService, key: &str, url: &str) -> InferenceService {
    isvc.status
        .get_or_insert_with(Default::default)
        .components
        .insert(
            key.to_string(),
            ComponentStatus {
                url: Some(url.to_string()),
            },
        );
    isvc
}

/// Route whose single gateway parent reports one `Accepted` condition
pub fn with_parent_condition(
    mut route: HTTPRoute,
    status: &str,
    reason: &str,
    message: &str,
) -> HTTPRoute {
    route.status = Some(HTTPRouteStatus {
        parents: vec![HTTPRouteStatusParents {
            conditions: vec![MetaCondition {
                type_: "Accepted".to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                observed_generation: None,
                last_transition_time: Time(chrono::Utc::now()),
            }],
            controller_name: "istio.io/gateway-controller".to_string(),
            parent_ref: HTTPRouteStatusParentsParentRef {
                name: "ome-gateway".to_string(),
                namespace: Some("ome".to_string()),
                ..Default::default()
            },
        }],
    });
    route
}
