//! Ingress configuration
//!
//! The base configuration is read once from the `ingress` key of the
//! `inferenceservice-config` ConfigMap. Per-service overrides come from
//! `ome.io/ingress-*` annotations and are applied with [`IngressConfig::resolve`],
//! which never mutates the base.

use crate::controller::builders::http_route::parse_gateway_ref;
use crate::controller::services::template;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// ConfigMap holding controller configuration
pub const INFERENCE_SERVICE_CONFIG_MAP: &str = "inferenceservice-config";

/// Key of the ingress section inside [`INFERENCE_SERVICE_CONFIG_MAP`]
pub const INGRESS_CONFIG_KEY: &str = "ingress";

/// ConfigMap listing the serving domains, one per key
pub const DOMAIN_CONFIG_MAP: &str = "config-domain";

pub const DEFAULT_DOMAIN_TEMPLATE: &str = "{{ .Name }}.{{ .Namespace }}.{{ .IngressDomain }}";
pub const DEFAULT_INGRESS_DOMAIN: &str = "example.com";
pub const DEFAULT_URL_SCHEME: &str = "http";

const DEFAULT_CONTROLLER_NAMESPACE: &str = "ome";
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "knative-serving";

/// Annotation keys recognised on an InferenceService
pub mod annotations {
    pub const DEPLOYMENT_MODE: &str = "ome.io/deploymentMode";
    pub const INGRESS_DOMAIN_TEMPLATE: &str = "ome.io/ingress-domain-template";
    pub const INGRESS_DOMAIN: &str = "ome.io/ingress-domain";
    pub const INGRESS_ADDITIONAL_DOMAINS: &str = "ome.io/ingress-additional-domains";
    pub const INGRESS_URL_SCHEME: &str = "ome.io/ingress-url-scheme";
    pub const INGRESS_PATH_TEMPLATE: &str = "ome.io/ingress-path-template";
    pub const INGRESS_DISABLE_ISTIO_VIRTUAL_HOST: &str = "ome.io/ingress-disable-istio-virtualhost";
    pub const INGRESS_DISABLE_CREATION: &str = "ome.io/ingress-disable-creation";
    /// Set to "true" to tear down the service's ingress children
    pub const STOP: &str = "ome.io/stop";
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("unable to parse ingress config json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid ingress config - {0}")]
    Invalid(String),

    #[error("invalid ingress config, unable to parse pathTemplate: {0}")]
    PathTemplate(#[from] template::TemplateError),
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct IngressConfig {
    /// External mesh gateway, `<namespace>/<name>`
    pub ingress_gateway: String,

    pub ingress_service: String,

    /// In-cluster mesh gateway, `<namespace>/<name>`
    pub local_gateway: String,

    /// Hostname targeted by the external-name service
    pub local_gateway_service: String,

    /// Destination host of virtual-service routes
    pub knative_local_gateway_service: String,

    /// Gateway-API parent gateway, `<namespace>/<name>`
    pub ome_ingress_gateway: String,

    pub ingress_domain: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_ingress_domains: Option<Vec<String>>,

    pub domain_template: String,

    pub url_scheme: String,

    pub disable_istio_virtual_host: bool,

    pub path_template: String,

    pub disable_ingress_creation: bool,

    #[serde(rename = "enableGatewayAPI")]
    pub enable_gateway_api: bool,
}

impl IngressConfig {
    /// Parse and validate the JSON stored in the ConfigMap, then fill defaults
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: IngressConfig = serde_json::from_str(raw)?;

        if config.ingress_gateway.is_empty() || config.ingress_service.is_empty() {
            return Err(ConfigError::Invalid(
                "ingressGateway and ingressService are required".to_string(),
            ));
        }
        if config.enable_gateway_api && parse_gateway_ref(&config.ome_ingress_gateway).is_err() {
            return Err(ConfigError::Invalid(format!(
                "omeIngressGateway must be <namespace>/<name>, got {:?}",
                config.ome_ingress_gateway
            )));
        }
        if !config.path_template.is_empty() {
            template::compile(&config.path_template)?;
            if config.ingress_domain.is_empty() {
                return Err(ConfigError::Invalid(
                    "ingressDomain is required if pathTemplate is given".to_string(),
                ));
            }
        }

        Ok(config.with_defaults())
    }

    /// Build the config from the ConfigMap; a missing `ingress` key yields defaults
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self, ConfigError> {
        match config_map
            .data
            .as_ref()
            .and_then(|data| data.get(INGRESS_CONFIG_KEY))
        {
            Some(raw) => Self::from_json(raw),
            None => {
                warn!(
                    config_map = INFERENCE_SERVICE_CONFIG_MAP,
                    key = INGRESS_CONFIG_KEY,
                    "Ingress config key missing, using defaults"
                );
                Ok(IngressConfig::default().with_defaults())
            }
        }
    }

    fn with_defaults(mut self) -> Self {
        if self.domain_template.is_empty() {
            self.domain_template = DEFAULT_DOMAIN_TEMPLATE.to_string();
        }
        if self.ingress_domain.is_empty() {
            self.ingress_domain = DEFAULT_INGRESS_DOMAIN.to_string();
        }
        if self.url_scheme.is_empty() {
            self.url_scheme = DEFAULT_URL_SCHEME.to_string();
        }
        self
    }

    /// Overlay per-service annotation overrides onto this config.
    ///
    /// Unknown annotations are ignored, as are boolean overrides that are
    /// neither `true` nor `false`.
    pub fn resolve(&self, overrides: &BTreeMap<String, String>) -> IngressConfig {
        let mut effective = self.clone();

        let non_empty = |key: &str| overrides.get(key).filter(|v| !v.is_empty()).cloned();

        if let Some(v) = non_empty(annotations::INGRESS_DOMAIN_TEMPLATE) {
            effective.domain_template = v;
        }
        if let Some(v) = non_empty(annotations::INGRESS_DOMAIN) {
            effective.ingress_domain = v;
        }
        if let Some(v) = non_empty(annotations::INGRESS_URL_SCHEME) {
            effective.url_scheme = v;
        }
        if let Some(v) = non_empty(annotations::INGRESS_PATH_TEMPLATE) {
            effective.path_template = v;
        }
        if let Some(v) = non_empty(annotations::INGRESS_ADDITIONAL_DOMAINS) {
            let domains: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from)
                .collect();
            if !domains.is_empty() {
                effective.additional_ingress_domains = Some(domains);
            }
        }
        if let Some(v) = parse_bool(overrides, annotations::INGRESS_DISABLE_ISTIO_VIRTUAL_HOST) {
            effective.disable_istio_virtual_host = v;
        }
        if let Some(v) = parse_bool(overrides, annotations::INGRESS_DISABLE_CREATION) {
            effective.disable_ingress_creation = v;
        }

        effective
    }
}

fn parse_bool(overrides: &BTreeMap<String, String>, key: &str) -> Option<bool> {
    let raw = overrides.get(key)?;
    match raw.trim().parse::<bool>() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!(annotation = key, value = %raw, "Ignoring non-boolean annotation override");
            None
        }
    }
}

/// Namespace the controller runs in (env `POD_NAMESPACE`, default `ome`)
pub fn controller_namespace() -> String {
    std::env::var("POD_NAMESPACE").unwrap_or_else(|_| DEFAULT_CONTROLLER_NAMESPACE.to_string())
}

/// Namespace holding the domain ConfigMap (env `SYSTEM_NAMESPACE`, default `knative-serving`)
pub fn system_namespace() -> String {
    std::env::var("SYSTEM_NAMESPACE").unwrap_or_else(|_| DEFAULT_SYSTEM_NAMESPACE.to_string())
}

/// Load the base ingress config from the cluster
pub async fn load_ingress_config(
    client: &Client,
    namespace: &str,
) -> Result<IngressConfig, ConfigError> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let config_map = api.get(INFERENCE_SERVICE_CONFIG_MAP).await?;
    IngressConfig::from_config_map(&config_map)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
