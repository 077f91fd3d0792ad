use super::*;
use crate::config::{annotations, IngressConfig, DEFAULT_SYSTEM_NAMESPACE, DOMAIN_CONFIG_MAP};
use crate::controller::fixtures;
use crate::controller::store::MemoryStores;
use crate::controller::strategies::{reasons, StrategyError};
use crate::crd::inference_service::{
    component_keys, condition_types, Condition, ConditionStatus, InferenceService,
};
use gateway_api::apis::standard::httproutes::HTTPRoute;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{Ingress, IngressTLS};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::runtime::controller::Action;
use maplit::btreemap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

struct Harness {
    mem: MemoryStores,
    ctx: Arc<Context>,
}

impl Harness {
    fn new(config: IngressConfig) -> Self {
        let mem = MemoryStores::new();
        let ctx = Arc::new(Context::new_mock(mem.stores(), config));
        Harness { mem, ctx }
    }

    /// Seed the service and reconcile it
    async fn reconcile(&self, isvc: InferenceService) -> Result<Action, ReconcileError> {
        self.mem.inference_services.insert(isvc);
        self.reconcile_stored().await
    }

    /// Reconcile the stored copy, as the watcher would after a status write
    async fn reconcile_stored(&self) -> Result<Action, ReconcileError> {
        let isvc = self.stored();
        reconcile(Arc::new(isvc), self.ctx.clone()).await
    }

    fn stored(&self) -> InferenceService {
        self.mem.inference_services.object("u", "m").unwrap()
    }

    fn ingress_ready(&self) -> Condition {
        self.stored()
            .condition(condition_types::INGRESS_READY)
            .cloned()
            .expect("IngressReady written")
    }

    fn url(&self) -> Option<String> {
        self.stored().status.and_then(|s| s.url)
    }

    fn address(&self) -> Option<String> {
        self.stored()
            .status
            .and_then(|s| s.address)
            .and_then(|a| a.url)
    }
}

fn serverless(mut isvc: InferenceService) -> InferenceService {
    for component in [
        isvc.spec.engine.as_mut(),
        isvc.spec.router.as_mut(),
    ]
    .into_iter()
    .flatten()
    {
        component.min_replicas = Some(0);
    }
    isvc
}

fn ready_serverless_engine() -> InferenceService {
    fixtures::with_component_url(
        fixtures::ready(
            serverless(fixtures::engine_only()),
            &[condition_types::ENGINE_READY],
        ),
        component_keys::ENGINE,
        "http://m-engine-default.u.example.com",
    )
}

fn ready_router_and_decoder() -> InferenceService {
    fixtures::ready(
        fixtures::with_router_and_decoder(),
        &[
            condition_types::ENGINE_READY,
            condition_types::ROUTES_READY,
            condition_types::DECODER_READY,
        ],
    )
}

fn ingress_routes(ingress: &Ingress) -> Vec<(String, String)> {
    ingress
        .spec
        .as_ref()
        .unwrap()
        .rules
        .as_ref()
        .unwrap()
        .iter()
        .map(|rule| {
            let path = &rule.http.as_ref().unwrap().paths[0];
            (
                rule.host.clone().unwrap(),
                path.backend.service.as_ref().unwrap().name.clone(),
            )
        })
        .collect()
}

fn gateway_config() -> IngressConfig {
    IngressConfig {
        enable_gateway_api: true,
        ..fixtures::config()
    }
}

fn accept_routes(harness: &Harness, names: &[&str]) {
    for name in names {
        let route = harness.mem.http_routes.object("u", name).unwrap();
        harness
            .mem
            .http_routes
            .insert(fixtures::with_parent_condition(route, "True", "Accepted", ""));
    }
}

#[tokio::test]
async fn test_serverless_engine_only_ready() {
    let h = Harness::new(fixtures::config());
    h.reconcile(ready_serverless_engine()).await.unwrap();

    let vs = h.mem.virtual_services.object("u", "m").unwrap();
    assert_eq!(vs.spec.hosts, vec!["m.u.svc.cluster.local", "m.u.example.com"]);
    assert_eq!(
        vs.spec.gateways,
        vec![fixtures::LOCAL_GATEWAY, "mesh", fixtures::INGRESS_GATEWAY]
    );
    assert_eq!(vs.spec.http.len(), 1);

    let service = h.mem.services.object("u", "m").unwrap();
    let spec = service.spec.unwrap();
    assert_eq!(spec.type_.as_deref(), Some("ExternalName"));
    assert_eq!(spec.external_name.as_deref(), Some(fixtures::LOCAL_GATEWAY_SERVICE));

    assert_eq!(h.ingress_ready().status, ConditionStatus::True);
    assert_eq!(h.url().as_deref(), Some("http://m.u.example.com"));
    assert_eq!(h.address().as_deref(), Some("http://m.u.svc.cluster.local"));
}

#[tokio::test]
async fn test_raw_router_and_decoder_ingress() {
    let h = Harness::new(fixtures::config());
    h.reconcile(ready_router_and_decoder()).await.unwrap();

    let ingress = h.mem.ingresses.object("u", "m").unwrap();
    assert_eq!(
        ingress_routes(&ingress),
        vec![
            ("m.u.example.com".to_string(), "m".to_string()),
            ("m-router.u.example.com".to_string(), "m".to_string()),
            ("m-engine.u.example.com".to_string(), "m-engine".to_string()),
            ("m-decoder.u.example.com".to_string(), "m".to_string()),
        ]
    );
    assert_eq!(h.ingress_ready().status, ConditionStatus::True);
    assert_eq!(h.url().as_deref(), Some("http://m.u.example.com"));
    assert_eq!(h.address().as_deref(), Some("http://m.u.svc.cluster.local"));
}

#[tokio::test]
async fn test_raw_engine_only_address_targets_engine_service() {
    let h = Harness::new(fixtures::config());
    h.reconcile(fixtures::ready(
        fixtures::engine_only(),
        &[condition_types::ENGINE_READY],
    ))
    .await
    .unwrap();

    assert_eq!(h.address().as_deref(), Some("http://m-engine.u.svc.cluster.local"));
}

#[tokio::test]
async fn test_decoder_not_ready_creates_nothing() {
    let h = Harness::new(fixtures::config());
    let mut isvc = fixtures::ready(fixtures::with_decoder(), &[condition_types::ENGINE_READY]);
    fixtures::set_condition(&mut isvc, condition_types::DECODER_READY, ConditionStatus::False);

    h.reconcile(isvc).await.unwrap();

    assert_eq!(h.mem.ingresses.len(), 0);
    assert_eq!(h.mem.child_writes(), 0);
    let condition = h.ingress_ready();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason.as_deref(), Some("Decoder ingress not created"));
    assert_eq!(h.url(), None);
}

#[tokio::test]
async fn test_engine_not_ready_never_reports_ready() {
    for config in [fixtures::config(), gateway_config()] {
        let h = Harness::new(config);
        h.reconcile(fixtures::engine_only()).await.unwrap();

        assert_eq!(h.mem.child_writes(), 0);
        assert_ne!(h.ingress_ready().status, ConditionStatus::True);
    }
}

#[tokio::test]
async fn test_ingress_creation_disabled() {
    let config = IngressConfig {
        disable_ingress_creation: true,
        ..fixtures::config()
    };
    let h = Harness::new(config);
    h.reconcile(ready_router_and_decoder()).await.unwrap();

    assert_eq!(h.mem.child_writes(), 0);
    let condition = h.ingress_ready();
    assert_eq!(condition.status, ConditionStatus::True);
    assert_eq!(condition.reason.as_deref(), Some(reasons::INGRESS_DISABLED));
    assert_eq!(
        condition.message.as_deref(),
        Some("Ingress creation is disabled, using external service for access")
    );
}

#[tokio::test]
async fn test_ingress_creation_disabled_by_annotation() {
    let h = Harness::new(fixtures::config());
    let mut isvc = ready_router_and_decoder();
    isvc.metadata.annotations = Some(btreemap! {
        annotations::INGRESS_DISABLE_CREATION.to_string() => "true".to_string(),
    });
    h.reconcile(isvc).await.unwrap();

    assert_eq!(h.mem.child_writes(), 0);
    assert_eq!(
        h.ingress_ready().reason.as_deref(),
        Some(reasons::INGRESS_DISABLED)
    );
}

#[tokio::test]
async fn test_cluster_local_serverless_has_only_internal_host() {
    let h = Harness::new(fixtures::config());
    let mut isvc = ready_serverless_engine();
    isvc.metadata.labels = Some(btreemap! {
        "networking.knative.dev/visibility".to_string() => "cluster-local".to_string(),
    });
    h.reconcile(isvc).await.unwrap();

    let vs = h.mem.virtual_services.object("u", "m").unwrap();
    assert_eq!(vs.spec.hosts, vec!["m.u.svc.cluster.local"]);
    assert_eq!(vs.spec.gateways, vec![fixtures::LOCAL_GATEWAY, "mesh"]);
}

#[tokio::test]
async fn test_cluster_local_raw_skips_ingress() {
    let h = Harness::new(fixtures::config());
    let mut isvc = fixtures::ready(fixtures::engine_only(), &[condition_types::ENGINE_READY]);
    isvc.metadata.labels = Some(btreemap! {
        "networking.knative.dev/visibility".to_string() => "cluster-local".to_string(),
    });
    h.reconcile(isvc).await.unwrap();

    assert_eq!(h.mem.ingresses.len(), 0);
    assert_eq!(h.ingress_ready().status, ConditionStatus::True);
    assert_eq!(h.url().as_deref(), Some("http://m.u.svc.cluster.local"));
}

#[tokio::test]
async fn test_domain_config_map_enables_additional_hosts() {
    let config = IngressConfig {
        additional_ingress_domains: Some(vec!["other.io".to_string()]),
        ..fixtures::config()
    };
    let h = Harness::new(config);
    h.mem.config_maps.insert(ConfigMap {
        metadata: ObjectMeta {
            name: Some(DOMAIN_CONFIG_MAP.to_string()),
            namespace: Some(DEFAULT_SYSTEM_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(btreemap! { "example.com".to_string() => String::new() }),
        ..Default::default()
    });

    h.reconcile(ready_serverless_engine()).await.unwrap();

    let vs = h.mem.virtual_services.object("u", "m").unwrap();
    assert!(vs.spec.hosts.contains(&"m.u.other.io".to_string()));
}

#[tokio::test]
async fn test_second_reconcile_writes_nothing() {
    for isvc in [ready_serverless_engine(), ready_router_and_decoder()] {
        let h = Harness::new(fixtures::config());
        h.reconcile(isvc).await.unwrap();
        assert!(h.mem.child_writes() > 0);

        h.mem.reset_counters();
        h.reconcile_stored().await.unwrap();

        assert_eq!(h.mem.child_writes(), 0);
        assert_eq!(
            h.mem.inference_services.status_patches.load(Ordering::SeqCst),
            0
        );
    }
}

#[tokio::test]
async fn test_drifted_ingress_is_restored() {
    let h = Harness::new(fixtures::config());
    h.reconcile(ready_router_and_decoder()).await.unwrap();
    let desired = h.mem.ingresses.object("u", "m").unwrap();

    let mut drifted = desired.clone();
    drifted.spec.as_mut().unwrap().rules.as_mut().unwrap()[0].host =
        Some("hijacked.example.com".to_string());
    drifted.metadata.labels = Some(btreemap! {"extra".to_string() => "1".to_string()});
    h.mem.ingresses.insert(drifted);
    h.mem.reset_counters();

    h.reconcile_stored().await.unwrap();

    let restored = h.mem.ingresses.object("u", "m").unwrap();
    assert_eq!(restored.spec, desired.spec);
    assert_eq!(restored.metadata.labels, desired.metadata.labels);
    assert_eq!(h.mem.ingresses.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ingress_fields_added_out_of_band_are_removed() {
    let h = Harness::new(fixtures::config());
    h.reconcile(ready_router_and_decoder()).await.unwrap();
    let desired = h.mem.ingresses.object("u", "m").unwrap();

    let mut drifted = desired.clone();
    drifted.spec.as_mut().unwrap().tls = Some(vec![IngressTLS {
        hosts: Some(vec!["evil.example.com".to_string()]),
        secret_name: Some("stolen".to_string()),
    }]);
    h.mem.ingresses.insert(drifted);
    h.mem.reset_counters();

    h.reconcile_stored().await.unwrap();

    let restored = h.mem.ingresses.object("u", "m").unwrap();
    assert_eq!(restored.spec.as_ref().unwrap().tls, None);
    assert_eq!(restored.spec, desired.spec);
    assert_eq!(h.mem.ingresses.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deleting_service_is_left_alone() {
    let h = Harness::new(fixtures::config());
    let mut isvc = ready_router_and_decoder();
    isvc.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    isvc.metadata.finalizers = Some(vec!["example.com/hold".to_string()]);

    let action = h.reconcile(isvc).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(h.mem.child_writes(), 0);
    assert_eq!(h.mem.ingresses.len(), 0);
    assert_eq!(
        h.mem.inference_services.status_patches.load(Ordering::SeqCst),
        0
    );
    assert!(h.stored().condition(condition_types::INGRESS_READY).is_none());
}

#[tokio::test]
async fn test_drifted_virtual_service_is_restored() {
    let h = Harness::new(fixtures::config());
    h.reconcile(ready_serverless_engine()).await.unwrap();
    let desired = h.mem.virtual_services.object("u", "m").unwrap();

    let mut drifted = desired.clone();
    drifted.spec.hosts = vec!["hijacked.example.com".to_string()];
    h.mem.virtual_services.insert(drifted);

    h.reconcile_stored().await.unwrap();

    let restored = h.mem.virtual_services.object("u", "m").unwrap();
    assert_eq!(restored.spec, desired.spec);
}

#[tokio::test]
async fn test_children_are_owned_and_filtered() {
    let h = Harness::new(fixtures::config());
    let mut isvc = ready_router_and_decoder();
    isvc.metadata.labels = Some(btreemap! {
        "app".to_string() => "chat".to_string(),
    });
    isvc.metadata.annotations = Some(btreemap! {
        "team".to_string() => "ml".to_string(),
        "kubectl.kubernetes.io/last-applied-configuration".to_string() => "{}".to_string(),
    });
    let uid = isvc.metadata.uid.clone().unwrap();
    h.reconcile(isvc).await.unwrap();

    let ingress = h.mem.ingresses.object("u", "m").unwrap();
    let owners = ingress.metadata.owner_references.unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].uid, uid);
    assert_eq!(owners[0].controller, Some(true));

    assert_eq!(ingress.metadata.labels.unwrap()["app"], "chat");
    let annotations = ingress.metadata.annotations.unwrap();
    assert_eq!(annotations["team"], "ml");
    assert!(!annotations.contains_key("kubectl.kubernetes.io/last-applied-configuration"));
}

#[tokio::test]
async fn test_stopped_service_removes_children() {
    let h = Harness::new(fixtures::config());
    h.reconcile(ready_serverless_engine()).await.unwrap();
    assert_eq!(h.mem.virtual_services.len(), 1);
    assert_eq!(h.mem.services.len(), 1);

    let mut stopped = h.stored();
    stopped.metadata.annotations = Some(btreemap! {
        annotations::STOP.to_string() => "true".to_string(),
    });
    h.reconcile(stopped).await.unwrap();

    assert_eq!(h.mem.virtual_services.len(), 0);
    assert_eq!(h.mem.services.len(), 0);
    let condition = h.ingress_ready();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason.as_deref(), Some(reasons::STOPPED));
    assert_eq!(h.url(), None);
    assert_eq!(h.address(), None);
}

#[tokio::test]
async fn test_stop_leaves_foreign_objects_alone() {
    let h = Harness::new(fixtures::config());
    h.mem.services.insert(Service {
        metadata: ObjectMeta {
            name: Some("m".to_string()),
            namespace: Some("u".to_string()),
            ..Default::default()
        },
        ..Default::default()
    });
    let mut isvc = ready_serverless_engine();
    isvc.metadata.annotations = Some(btreemap! {
        annotations::STOP.to_string() => "true".to_string(),
    });

    h.reconcile(isvc).await.unwrap();

    assert_eq!(h.mem.services.len(), 1);
}

#[tokio::test]
async fn test_disabled_virtual_host_uses_component_url() {
    let config = IngressConfig {
        disable_istio_virtual_host: true,
        ..fixtures::config()
    };
    let h = Harness::new(config);
    h.reconcile(ready_serverless_engine()).await.unwrap();

    assert_eq!(h.mem.virtual_services.len(), 0);
    assert_eq!(h.mem.services.len(), 0);
    assert_eq!(h.ingress_ready().status, ConditionStatus::True);
    assert_eq!(
        h.url().as_deref(),
        Some("http://m-engine-default.u.example.com")
    );
    assert_eq!(
        h.address().as_deref(),
        Some("http://m-engine-default.u.svc.cluster.local")
    );
}

#[tokio::test]
async fn test_unsupported_mode_is_reported() {
    let h = Harness::new(fixtures::config());
    let mut isvc = fixtures::ready(fixtures::engine_only(), &[condition_types::ENGINE_READY]);
    isvc.metadata.annotations = Some(btreemap! {
        annotations::DEPLOYMENT_MODE.to_string() => "VirtualDeployment".to_string(),
    });

    let err = h.reconcile(isvc).await.unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::StrategyError(StrategyError::UnsupportedDeploymentMode(_))
    ));
    let condition = h.ingress_ready();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(
        condition.reason.as_deref(),
        Some(reasons::UNSUPPORTED_DEPLOYMENT_MODE)
    );
    assert_eq!(h.mem.child_writes(), 0);
}

#[tokio::test]
async fn test_invalid_path_template_is_reported() {
    let h = Harness::new(fixtures::config());
    let mut isvc = ready_serverless_engine();
    isvc.metadata.annotations = Some(btreemap! {
        annotations::INGRESS_PATH_TEMPLATE.to_string() => "http://evil.io/{{ .Name }}".to_string(),
    });

    let err = h.reconcile(isvc).await.unwrap_err();

    assert!(matches!(err, ReconcileError::StrategyError(_)));
    let condition = h.ingress_ready();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason.as_deref(), Some(reasons::INVALID_PATH_TEMPLATE));
}

#[tokio::test]
async fn test_missing_namespace_is_an_error() {
    let h = Harness::new(fixtures::config());
    let mut isvc = fixtures::engine_only();
    isvc.metadata.namespace = None;

    let err = reconcile(Arc::new(isvc), h.ctx.clone()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::MissingNamespace));
}

#[tokio::test]
async fn test_gateway_waits_for_parent_status() {
    let h = Harness::new(gateway_config());
    h.reconcile(fixtures::ready(
        fixtures::engine_only(),
        &[condition_types::ENGINE_READY],
    ))
    .await
    .unwrap();

    assert!(h.mem.http_routes.object("u", "m-engine").is_some());
    assert!(h.mem.http_routes.object("u", "m").is_some());
    assert_eq!(h.mem.http_routes.creates.load(Ordering::SeqCst), 2);

    let condition = h.ingress_ready();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(
        condition.reason.as_deref(),
        Some(reasons::PARENT_STATUS_NOT_AVAILABLE)
    );
    assert_eq!(condition.message.as_deref(), Some("Engine HttpRouteNotReady"));
    assert_eq!(h.url(), None);
}

#[tokio::test]
async fn test_gateway_ready_once_parents_accept() {
    let h = Harness::new(gateway_config());
    h.reconcile(fixtures::ready(
        fixtures::engine_only(),
        &[condition_types::ENGINE_READY],
    ))
    .await
    .unwrap();
    accept_routes(&h, &["m-engine", "m"]);
    h.mem.reset_counters();

    h.reconcile_stored().await.unwrap();

    assert_eq!(h.mem.child_writes(), 0);
    assert_eq!(h.ingress_ready().status, ConditionStatus::True);
    assert_eq!(h.url().as_deref(), Some("http://m.u.example.com:8080"));
    assert_eq!(
        h.address().as_deref(),
        Some("http://m-engine.u.svc.cluster.local:8080")
    );
}

#[tokio::test]
async fn test_gateway_uses_entry_service_port() {
    let h = Harness::new(gateway_config());
    h.mem.services.insert(Service {
        metadata: ObjectMeta {
            name: Some("m-engine".to_string()),
            namespace: Some("u".to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port: 9000,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    });
    h.reconcile(fixtures::ready(
        fixtures::engine_only(),
        &[condition_types::ENGINE_READY],
    ))
    .await
    .unwrap();
    accept_routes(&h, &["m-engine", "m"]);

    h.reconcile_stored().await.unwrap();

    assert_eq!(h.url().as_deref(), Some("http://m.u.example.com:9000"));
}

#[tokio::test]
async fn test_gateway_reports_rejected_parent() {
    let h = Harness::new(gateway_config());
    h.reconcile(fixtures::ready(
        fixtures::engine_only(),
        &[condition_types::ENGINE_READY],
    ))
    .await
    .unwrap();
    accept_routes(&h, &["m"]);
    let engine_route = h.mem.http_routes.object("u", "m-engine").unwrap();
    h.mem.http_routes.insert(fixtures::with_parent_condition(
        engine_route,
        "False",
        "NoMatchingParent",
        "gateway not found",
    ));

    h.reconcile_stored().await.unwrap();

    let condition = h.ingress_ready();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason.as_deref(), Some("NoMatchingParent"));
    assert_eq!(condition.message.as_deref(), Some("Engine gateway not found"));
}

#[tokio::test]
async fn test_gateway_stops_at_not_ready_component() {
    let h = Harness::new(gateway_config());
    let mut isvc = fixtures::ready(fixtures::with_router(), &[condition_types::ENGINE_READY]);
    fixtures::set_condition(&mut isvc, condition_types::ROUTES_READY, ConditionStatus::False);

    h.reconcile(isvc).await.unwrap();

    assert!(h.mem.http_routes.object("u", "m-engine").is_some());
    assert_eq!(h.mem.http_routes.len(), 1);
    let condition = h.ingress_ready();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason.as_deref(), Some("Router ingress not created"));
    assert_eq!(
        condition.message.as_deref(),
        Some("router component not ready for HTTPRoute creation")
    );
}

#[tokio::test]
async fn test_gateway_drift_is_restored() {
    let h = Harness::new(gateway_config());
    h.reconcile(fixtures::ready(
        fixtures::engine_only(),
        &[condition_types::ENGINE_READY],
    ))
    .await
    .unwrap();
    let desired = h.mem.http_routes.object("u", "m").unwrap();

    let mut drifted = desired.clone();
    drifted.spec.hostnames = Some(vec!["hijacked.example.com".to_string()]);
    h.mem.http_routes.insert(drifted);
    h.mem.reset_counters();

    h.reconcile_stored().await.unwrap();

    let restored = h.mem.http_routes.object("u", "m").unwrap();
    assert_eq!(restored.spec.hostnames, desired.spec.hostnames);
    assert_eq!(h.mem.http_routes.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_metrics_record_strategy_results() {
    let mem = MemoryStores::new();
    let metrics = crate::server::create_metrics().unwrap();
    let ctx = Arc::new(Context {
        metrics: Some(metrics.clone()),
        ..Context::new_mock(mem.stores(), fixtures::config())
    });
    let isvc = ready_router_and_decoder();
    mem.inference_services.insert(isvc.clone());

    reconcile(Arc::new(isvc), ctx).await.unwrap();

    assert_eq!(metrics.reconciliation_count("KubernetesIngress", "success"), 1);
}

#[test]
fn test_error_policy_requeues() {
    let mem = MemoryStores::new();
    let ctx = Arc::new(Context::new_mock(mem.stores(), fixtures::config()));
    let action = error_policy(
        Arc::new(fixtures::engine_only()),
        &ReconcileError::MissingNamespace,
        ctx,
    );
    assert_eq!(action, Action::requeue(std::time::Duration::from_secs(10)));
}
