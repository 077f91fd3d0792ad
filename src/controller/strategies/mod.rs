//! Ingress strategies
//!
//! One strategy per way of exposing a service:
//! - [`ServerlessStrategy`]: mesh VirtualService plus an ExternalName service
//! - [`KubeIngressStrategy`]: a single networking/v1 Ingress
//! - [`GatewayApiStrategy`]: Gateway API HTTPRoutes
//!
//! [`StrategyFactory`] picks one from the deployment mode and the effective
//! config. Each strategy writes its children through the context's stores and
//! leaves `status.url`, `status.address` and `IngressReady` on the service.

pub mod gateway_api;
pub mod kube_ingress;
pub mod serverless;

pub use gateway_api::GatewayApiStrategy;
pub use kube_ingress::KubeIngressStrategy;
pub use serverless::ServerlessStrategy;

use crate::config::IngressConfig;
use crate::controller::builders::{BuildError, NotReady};
use crate::controller::ingress::deployment::DeploymentMode;
use crate::controller::ingress::Context;
use crate::controller::services::{DomainError, DomainService, PathError, PathService};
use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::inference_service::{
    condition_types, Addressable, Condition, ConditionStatus, InferenceService,
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// `IngressReady` reasons written by the strategies
pub mod reasons {
    pub const INGRESS_DISABLED: &str = "IngressDisabled";
    pub const STOPPED: &str = "Stopped";
    pub const PARENT_STATUS_NOT_AVAILABLE: &str = "ParentStatusNotAvailable";
    pub const HTTP_ROUTE_NOT_READY: &str = "HttpRouteNotReady";
    pub const UNSUPPORTED_DEPLOYMENT_MODE: &str = "UnsupportedDeploymentMode";
    pub const INVALID_DOMAIN_NAME: &str = "InvalidDomainName";
    pub const INVALID_PATH_TEMPLATE: &str = "InvalidPathTemplate";
    pub const TEMPLATE_PARSE_ERROR: &str = "TemplateParseError";
    pub const INVALID_GATEWAY: &str = "InvalidGatewayReference";
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("deployment mode {0} has no ingress strategy")]
    UnsupportedDeploymentMode(DeploymentMode),

    #[error("InferenceService missing {0}")]
    MissingField(&'static str),
}

impl StrategyError {
    /// Reason to record on `IngressReady` when the user can fix the error;
    /// `None` for transient failures that are only retried.
    pub fn user_reason(&self) -> Option<&'static str> {
        match self {
            StrategyError::UnsupportedDeploymentMode(_) => {
                Some(reasons::UNSUPPORTED_DEPLOYMENT_MODE)
            }
            StrategyError::Build(BuildError::Domain(DomainError::InvalidDomainName(_))) => {
                Some(reasons::INVALID_DOMAIN_NAME)
            }
            StrategyError::Build(BuildError::Domain(DomainError::Template(_)))
            | StrategyError::Build(BuildError::Path(PathError::Template(_))) => {
                Some(reasons::TEMPLATE_PARSE_ERROR)
            }
            StrategyError::Build(BuildError::Path(PathError::InvalidPathTemplate { .. })) => {
                Some(reasons::INVALID_PATH_TEMPLATE)
            }
            StrategyError::Build(BuildError::InvalidGatewayRef(_)) => {
                Some(reasons::INVALID_GATEWAY)
            }
            StrategyError::Build(BuildError::MissingNamespace)
            | StrategyError::Store(_)
            | StrategyError::MissingField(_) => None,
        }
    }
}

#[async_trait]
pub trait IngressStrategy: Send + Sync {
    /// Name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Converge the service's ingress children and record the outcome on
    /// `isvc.status`. The caller persists the status.
    async fn reconcile(
        &self,
        isvc: &mut InferenceService,
        ctx: &Context,
    ) -> Result<(), StrategyError>;
}

/// Builds the strategy for a deployment mode, sharing one domain and path service
#[derive(Clone)]
pub struct StrategyFactory {
    domain_service: Arc<dyn DomainService>,
    path_service: Arc<dyn PathService>,
}

impl StrategyFactory {
    pub fn new(domain_service: Arc<dyn DomainService>, path_service: Arc<dyn PathService>) -> Self {
        Self {
            domain_service,
            path_service,
        }
    }

    /// `config` is the effective config for the service being reconciled
    pub fn create(
        &self,
        mode: DeploymentMode,
        config: &IngressConfig,
    ) -> Result<Box<dyn IngressStrategy>, StrategyError> {
        let domain = self.domain_service.clone();
        let path = self.path_service.clone();
        let config = config.clone();

        let strategy: Box<dyn IngressStrategy> = match mode {
            DeploymentMode::Serverless => Box::new(ServerlessStrategy::new(config, domain, path)),
            DeploymentMode::RawDeployment | DeploymentMode::MultiNode => {
                if config.enable_gateway_api {
                    Box::new(GatewayApiStrategy::new(config, domain, path))
                } else {
                    Box::new(KubeIngressStrategy::new(config, domain))
                }
            }
            other => return Err(StrategyError::UnsupportedDeploymentMode(other)),
        };
        debug!(mode = %mode, strategy = strategy.name(), "Selected ingress strategy");
        Ok(strategy)
    }
}

/// Record a successful pass: ready condition plus URL and address
pub(crate) fn mark_ready(isvc: &mut InferenceService, ctx: &Context, url: String, address: String) {
    let status = isvc.status.get_or_insert_with(Default::default);
    status.url = Some(url);
    status.address = Some(Addressable { url: Some(address) });
    status.set_condition(
        Condition::new(condition_types::INGRESS_READY, ConditionStatus::True),
        &ctx.clock.now_rfc3339(),
    );
}

/// Record a non-ready `IngressReady`. URL and address are only published
/// while the service is ready, so they are cleared.
pub(crate) fn mark_not_ready(
    isvc: &mut InferenceService,
    ctx: &Context,
    status: ConditionStatus,
    reason: &str,
    message: Option<String>,
) {
    let mut condition = Condition::new(condition_types::INGRESS_READY, status).with_reason(reason);
    if let Some(message) = message {
        condition = condition.with_message(message);
    }
    let isvc_status = isvc.status.get_or_insert_with(Default::default);
    isvc_status.url = None;
    isvc_status.address = None;
    isvc_status.set_condition(condition, &ctx.clock.now_rfc3339());
}

pub(crate) fn record_not_ready(isvc: &mut InferenceService, ctx: &Context, not_ready: NotReady) {
    info!(
        isvc = ?isvc.metadata.name,
        reason = %not_ready.reason,
        "Ingress not created, component not ready"
    );
    mark_not_ready(isvc, ctx, not_ready.status, &not_ready.reason, None);
}

/// What an apply did to the stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
    Unchanged,
}

/// Create `desired` if absent, otherwise replace it when `drifted(desired,
/// existing)` holds. Updates carry the stored resourceVersion.
pub(crate) async fn apply<K>(
    store: &dyn ResourceStore<K>,
    mut desired: K,
    drifted: impl Fn(&K, &K) -> bool,
) -> Result<Applied, StoreError>
where
    K: Resource + Clone + Send + Sync,
{
    let namespace = desired.meta().namespace.clone().unwrap_or_default();
    let name = desired.meta().name.clone().unwrap_or_default();

    match store.get(&namespace, &name).await? {
        None => {
            store.create(&desired).await?;
            Ok(Applied::Created)
        }
        Some(existing) if drifted(&desired, &existing) => {
            desired.meta_mut().resource_version = existing.meta().resource_version.clone();
            store.replace(&desired, false).await?;
            Ok(Applied::Updated)
        }
        Some(_) => Ok(Applied::Unchanged),
    }
}

/// Delete `namespace/name` if the service controls it; foreign objects are left alone
pub(crate) async fn delete_owned<K>(
    store: &dyn ResourceStore<K>,
    isvc: &InferenceService,
    namespace: &str,
    name: &str,
) -> Result<bool, StoreError>
where
    K: Resource + Send + Sync,
{
    let Some(existing) = store.get(namespace, name).await? else {
        return Ok(false);
    };
    if !is_owned_by(existing.meta(), isvc) {
        debug!(name = %name, namespace = %namespace, "Not deleting object owned by someone else");
        return Ok(false);
    }
    store.delete(namespace, name).await?;
    Ok(true)
}

fn is_owned_by(meta: &ObjectMeta, isvc: &InferenceService) -> bool {
    let Some(uid) = isvc.metadata.uid.as_deref() else {
        return false;
    };
    meta.owner_references
        .iter()
        .flatten()
        .any(|owner| owner.uid == uid && owner.controller == Some(true))
}

/// Labels or annotations differ; an unset map equals an empty one
pub(crate) fn metadata_drifted(desired: &ObjectMeta, existing: &ObjectMeta) -> bool {
    let empty = BTreeMap::new();
    let map = |m: &Option<BTreeMap<String, String>>| m.as_ref().unwrap_or(&empty).clone();
    map(&desired.labels) != map(&existing.labels)
        || map(&desired.annotations) != map(&existing.annotations)
}

/// Every field set in `desired` has the same value in `existing`. Fields the
/// server defaulted on `existing` are ignored; arrays must match element-wise.
pub(crate) fn is_semantic_subset<T: Serialize>(desired: &T, existing: &T) -> bool {
    match (serde_json::to_value(desired), serde_json::to_value(existing)) {
        (Ok(desired), Ok(existing)) => value_subset(&desired, &existing),
        _ => false,
    }
}

fn value_subset(desired: &Value, existing: &Value) -> bool {
    match (desired, existing) {
        (Value::Null, _) => true,
        (Value::Object(d), Value::Object(e)) => d
            .iter()
            .all(|(key, value)| value_subset(value, e.get(key).unwrap_or(&Value::Null))),
        (Value::Array(d), Value::Array(e)) => {
            d.len() == e.len() && d.iter().zip(e).all(|(d, e)| value_subset(d, e))
        }
        (d, e) => d == e,
    }
}
