//! Deployment mode selection
//!
//! The mode decides which ingress strategy runs. It is read from the
//! `ome.io/deploymentMode` annotation when present, then from the
//! entrypoint component's own hint, and otherwise inferred from the component specs.

use crate::config::annotations;
use crate::crd::inference_service::{ComponentSpec, InferenceService};
use kube::ResourceExt;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentMode {
    Serverless,
    RawDeployment,
    MultiNode,
    MultiNodeRayVLLM,
    PDDisaggregated,
    VirtualDeployment,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Serverless => "Serverless",
            DeploymentMode::RawDeployment => "RawDeployment",
            DeploymentMode::MultiNode => "MultiNode",
            DeploymentMode::MultiNodeRayVLLM => "MultiNodeRayVLLM",
            DeploymentMode::PDDisaggregated => "PDDisaggregated",
            DeploymentMode::VirtualDeployment => "VirtualDeployment",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDeploymentMode(pub String);

impl FromStr for DeploymentMode {
    type Err = UnknownDeploymentMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Serverless" => Ok(DeploymentMode::Serverless),
            "RawDeployment" => Ok(DeploymentMode::RawDeployment),
            "MultiNode" => Ok(DeploymentMode::MultiNode),
            "MultiNodeRayVLLM" => Ok(DeploymentMode::MultiNodeRayVLLM),
            "PDDisaggregated" => Ok(DeploymentMode::PDDisaggregated),
            "VirtualDeployment" => Ok(DeploymentMode::VirtualDeployment),
            other => Err(UnknownDeploymentMode(other.to_string())),
        }
    }
}

/// Outermost component receiving external traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entrypoint {
    Router,
    Engine,
    Decoder,
}

impl Entrypoint {
    pub fn of(isvc: &InferenceService) -> Option<(Entrypoint, &ComponentSpec)> {
        if let Some(router) = isvc.spec.router.as_ref() {
            Some((Entrypoint::Router, router))
        } else if let Some(engine) = isvc.engine_spec() {
            Some((Entrypoint::Engine, engine))
        } else {
            isvc.spec
                .decoder
                .as_ref()
                .map(|decoder| (Entrypoint::Decoder, decoder))
        }
    }
}

fn infer_from_spec(spec: &ComponentSpec, has_decoder: bool) -> DeploymentMode {
    if spec.leader.is_some() && spec.worker.is_some() {
        DeploymentMode::MultiNode
    } else if spec.min_replicas == Some(0) && !has_decoder {
        DeploymentMode::Serverless
    } else {
        DeploymentMode::RawDeployment
    }
}

/// Deployment mode of the service's entrypoint component
pub fn determine_deployment_mode(isvc: &InferenceService) -> DeploymentMode {
    let has_decoder = isvc.has_decoder();

    if let Some(raw) = isvc.annotations().get(annotations::DEPLOYMENT_MODE) {
        match raw.parse::<DeploymentMode>() {
            Ok(mode) => return force_non_serverless(mode, has_decoder),
            Err(UnknownDeploymentMode(value)) => {
                debug!(value = %value, "Ignoring unknown deployment mode annotation")
            }
        }
    }

    let Some((entrypoint, spec)) = Entrypoint::of(isvc) else {
        info!(
            isvc = ?isvc.metadata.name,
            "No components in spec, falling back to RawDeployment"
        );
        return DeploymentMode::RawDeployment;
    };

    let mode = spec
        .deployment_mode
        .as_deref()
        .and_then(|hint| hint.parse::<DeploymentMode>().ok())
        .unwrap_or_else(|| infer_from_spec(spec, has_decoder));

    debug!(
        isvc = ?isvc.metadata.name,
        entrypoint = ?entrypoint,
        mode = %mode,
        "Determined deployment mode"
    );
    force_non_serverless(mode, has_decoder)
}

/// Serverless is not supported alongside a decoder
fn force_non_serverless(mode: DeploymentMode, has_decoder: bool) -> DeploymentMode {
    if mode == DeploymentMode::Serverless && has_decoder {
        DeploymentMode::RawDeployment
    } else {
        mode
    }
}
