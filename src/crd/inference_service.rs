use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// InferenceService describes a model-serving deployment made of up to three
/// components: an engine (always), an optional router in front of it and an
/// optional decoder.
///
/// Only the fields the ingress reconciler reads are modelled here.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "ome.io",
    version = "v1beta1",
    kind = "InferenceService",
    plural = "inferenceservices",
    shortname = "isvc",
    namespaced,
    status = "InferenceServiceStatus",
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type=='IngressReady')].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct InferenceServiceSpec {
    /// Model engine component
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<ComponentSpec>,

    /// Legacy name of the engine component, read only when `engine` is absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictor: Option<ComponentSpec>,

    /// Optional router fronting the engine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<ComponentSpec>,

    /// Optional decoder running next to the engine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoder: Option<ComponentSpec>,
}

/// Shared shape of engine, router and decoder specs
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ComponentSpec {
    /// Deployment mode hint (Serverless, RawDeployment, MultiNode, ...)
    #[serde(rename = "deploymentMode", skip_serializing_if = "Option::is_none")]
    pub deployment_mode: Option<String>,

    #[serde(rename = "minReplicas", skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    #[serde(rename = "maxReplicas", skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,

    /// Leader pod of a multi-node deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader: Option<LeaderSpec>,

    /// Worker pods of a multi-node deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerSpec>,

    /// Request timeout for routes targeting this component
    #[serde(rename = "timeoutSeconds", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct LeaderSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct WorkerSpec {
    /// Number of worker pods per leader
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Condition types written or read by the ingress reconciler
pub mod condition_types {
    pub const ENGINE_READY: &str = "EngineReady";
    pub const ROUTES_READY: &str = "RoutesReady";
    pub const DECODER_READY: &str = "DecoderReady";
    pub const PREDICTOR_READY: &str = "PredictorReady";
    pub const INGRESS_READY: &str = "IngressReady";
}

/// Keys of `status.components`
pub mod component_keys {
    pub const ENGINE: &str = "engine";
    pub const ROUTER: &str = "router";
    pub const DECODER: &str = "decoder";
    pub const PREDICTOR: &str = "predictor";
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// RFC3339 timestamp of the last status change
    #[serde(rename = "lastTransitionTime", skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn new(type_: &str, status: ConditionStatus) -> Self {
        Condition {
            type_: type_.to_string(),
            status,
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ComponentStatus {
    /// Externally visible URL of the component
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Addressable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct InferenceServiceStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Per-component status keyed by `engine`, `router`, `decoder`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, ComponentStatus>,

    /// Public URL of the service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// In-cluster address of the service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Addressable>,
}

impl InferenceServiceStatus {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Insert or replace a condition.
    ///
    /// `lastTransitionTime` only moves when the status value changes, so
    /// rewriting an identical condition leaves the status untouched.
    pub fn set_condition(&mut self, mut condition: Condition, now: &str) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            Some(existing) => {
                condition.last_transition_time = if existing.status == condition.status {
                    existing.last_transition_time.clone()
                } else {
                    Some(now.to_string())
                };
                *existing = condition;
            }
            None => {
                condition.last_transition_time = Some(now.to_string());
                self.conditions.push(condition);
            }
        }
    }
}

impl InferenceService {
    /// Engine spec, falling back to the legacy `predictor` field
    pub fn engine_spec(&self) -> Option<&ComponentSpec> {
        self.spec.engine.as_ref().or(self.spec.predictor.as_ref())
    }

    pub fn has_engine(&self) -> bool {
        self.engine_spec().is_some()
    }

    pub fn has_router(&self) -> bool {
        self.spec.router.is_some()
    }

    pub fn has_decoder(&self) -> bool {
        self.spec.decoder.is_some()
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.status.as_ref().and_then(|s| s.condition(type_))
    }

    /// Status of a condition; an absent condition reads as Unknown
    pub fn condition_status(&self, type_: &str) -> ConditionStatus {
        self.condition(type_)
            .map(|c| c.status)
            .unwrap_or(ConditionStatus::Unknown)
    }

    pub fn is_condition_true(&self, type_: &str) -> bool {
        self.condition_status(type_) == ConditionStatus::True
    }

    pub fn is_condition_unknown(&self, type_: &str) -> bool {
        self.condition_status(type_) == ConditionStatus::Unknown
    }

    /// Engine readiness. `PredictorReady` is honoured when `EngineReady` has
    /// never been written.
    pub fn engine_condition_status(&self) -> ConditionStatus {
        match self.condition(condition_types::ENGINE_READY) {
            Some(c) => c.status,
            None => self.condition_status(condition_types::PREDICTOR_READY),
        }
    }

    pub fn is_engine_ready(&self) -> bool {
        self.engine_condition_status() == ConditionStatus::True
    }

    /// URL recorded for a component in `status.components`
    pub fn component_url(&self, component: &str) -> Option<&str> {
        let status = self.status.as_ref()?;
        let entry = status.components.get(component).or_else(|| {
            if component == component_keys::ENGINE {
                status.components.get(component_keys::PREDICTOR)
            } else {
                None
            }
        })?;
        entry.url.as_deref()
    }

    pub fn set_condition(&mut self, condition: Condition, now: &str) {
        self.status
            .get_or_insert_with(Default::default)
            .set_condition(condition, now);
    }
}

#[cfg(test)]
#[path = "inference_service_test.rs"]
mod tests;
