//! Pure builders for the child resources each strategy owns
//!
//! Builders read the InferenceService, the effective config and the domain
//! and path services. They never talk to the cluster and never write
//! conditions; a failed readiness gate comes back as [`NotReady`] and the
//! strategy records it on `IngressReady`.

pub mod http_route;
pub mod ingress;
pub mod virtual_service;

pub use http_route::{HttpRouteBuilder, RouteComponent};
pub use ingress::IngressBuilder;
pub use virtual_service::VirtualServiceBuilder;

use crate::controller::ingress::naming::{DISALLOWED_ANNOTATIONS, DISALLOWED_LABELS};
use crate::controller::services::{DomainError, PathError};
use crate::crd::inference_service::{ConditionStatus, InferenceService};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to generate domain: {0}")]
    Domain(#[from] DomainError),

    #[error("failed to generate url path: {0}")]
    Path(#[from] PathError),

    #[error("InferenceService missing namespace")]
    MissingNamespace,

    #[error("invalid gateway reference {0:?}, expected <namespace>/<name>")]
    InvalidGatewayRef(String),
}

/// Why a builder produced nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotReady {
    /// `IngressReady` status to record
    pub status: ConditionStatus,
    pub reason: String,
}

impl NotReady {
    /// Mirror a component condition: Unknown stays Unknown, anything else is False
    pub fn tracking(underlying: ConditionStatus, reason: impl Into<String>) -> Self {
        let status = match underlying {
            ConditionStatus::Unknown => ConditionStatus::Unknown,
            _ => ConditionStatus::False,
        };
        NotReady {
            status,
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        NotReady {
            status: ConditionStatus::False,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome<T> {
    Ready(T),
    NotReady(NotReady),
}

impl<T> BuildOutcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            BuildOutcome::Ready(obj) => Some(obj),
            BuildOutcome::NotReady(_) => None,
        }
    }
}

fn filter_map(
    source: Option<&BTreeMap<String, String>>,
    disallowed: &[&str],
) -> BTreeMap<String, String> {
    source
        .into_iter()
        .flatten()
        .filter(|(key, _)| !disallowed.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Annotations safe to copy onto children
pub fn filter_annotations(isvc: &InferenceService) -> BTreeMap<String, String> {
    filter_map(isvc.metadata.annotations.as_ref(), DISALLOWED_ANNOTATIONS)
}

/// Labels safe to copy onto children
pub fn filter_labels(isvc: &InferenceService) -> BTreeMap<String, String> {
    filter_map(isvc.metadata.labels.as_ref(), DISALLOWED_LABELS)
}

/// Controller owner reference pointing at the InferenceService
pub fn owner_references(isvc: &InferenceService) -> Option<Vec<OwnerReference>> {
    isvc.controller_owner_ref(&()).map(|owner| vec![owner])
}

pub(crate) fn namespace_of(isvc: &InferenceService) -> Result<&str, BuildError> {
    isvc.metadata
        .namespace
        .as_deref()
        .ok_or(BuildError::MissingNamespace)
}

/// Empty maps are left unset so they compare equal to what the server returns
pub(crate) fn non_empty(map: BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}
