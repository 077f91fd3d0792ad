//! Object store seam between the reconciler and the API server
//!
//! Strategies only talk to the cluster through [`ResourceStore`]. Production
//! uses [`KubeStore`]; tests use the in-memory store, which enforces the
//! same create-if-absent and resourceVersion rules.

use crate::crd::inference_service::InferenceService;
use crate::crd::virtual_service::VirtualService;
use async_trait::async_trait;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("conflicting update to {kind} {name}")]
    Conflict { kind: String, name: String },

    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{0} is missing metadata.name")]
    MissingName(String),

    #[error("{0} is missing metadata.namespace")]
    MissingNamespace(String),
}

impl StoreError {
    /// Optimistic-concurrency rejection; the whole reconcile should be retried
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Namespaced object store with optimistic concurrency
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Fetch an object; `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>;

    /// Create an object, failing with `AlreadyExists` if it is present
    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace an object. The object's resourceVersion is checked against
    /// the stored one. With `dry_run` nothing is persisted and the object
    /// the server would have stored is returned.
    async fn replace(&self, obj: &K, dry_run: bool) -> Result<K, StoreError>;

    /// Delete an object; deleting a missing object is not an error
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Merge-patch the status subresource
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<(), StoreError>;
}

fn identity<K: Resource>(obj: &K) -> Result<(String, String), StoreError>
where
    K::DynamicType: Default,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| StoreError::MissingName(kind.clone()))?;
    let namespace = obj
        .meta()
        .namespace
        .clone()
        .ok_or(StoreError::MissingNamespace(kind))?;
    Ok((namespace, name))
}

fn map_kube_error<K: Resource>(name: &str, err: kube::Error) -> StoreError
where
    K::DynamicType: Default,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    match err {
        kube::Error::Api(ref resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind,
                name: name.to_string(),
            }
        }
        kube::Error::Api(ref resp) if resp.code == 409 => StoreError::Conflict {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(ref resp) if resp.code == 404 => StoreError::NotFound {
            kind,
            name: name.to_string(),
        },
        other => StoreError::KubeError(other),
    }
}

/// [`ResourceStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        self.api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error::<K>(name, e))
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let (namespace, name) = identity(obj)?;
        self.api::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_error::<K>(&name, e))
    }

    async fn replace(&self, obj: &K, dry_run: bool) -> Result<K, StoreError> {
        let (namespace, name) = identity(obj)?;
        let params = PostParams {
            dry_run,
            ..Default::default()
        };
        self.api::<K>(&namespace)
            .replace(&name, &params, obj)
            .await
            .map_err(|e| map_kube_error::<K>(&name, e))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self
            .api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                debug!(name = %name, namespace = %namespace, "Object already gone");
                Ok(())
            }
            Err(e) => Err(map_kube_error::<K>(name, e)),
        }
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let patch = serde_json::json!({ "status": status });
        self.api::<K>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error::<K>(name, e))
    }
}

/// One store per kind the reconciler reads or writes
#[derive(Clone)]
pub struct Stores {
    pub inference_services: Arc<dyn ResourceStore<InferenceService>>,
    pub virtual_services: Arc<dyn ResourceStore<VirtualService>>,
    pub services: Arc<dyn ResourceStore<Service>>,
    pub ingresses: Arc<dyn ResourceStore<Ingress>>,
    pub http_routes: Arc<dyn ResourceStore<HTTPRoute>>,
    pub config_maps: Arc<dyn ResourceStore<ConfigMap>>,
}

impl Stores {
    pub fn kube(client: Client) -> Self {
        let store = KubeStore::new(client);
        Stores {
            inference_services: Arc::new(store.clone()),
            virtual_services: Arc::new(store.clone()),
            services: Arc::new(store.clone()),
            ingresses: Arc::new(store.clone()),
            http_routes: Arc::new(store.clone()),
            config_maps: Arc::new(store),
        }
    }
}

#[cfg(test)]
pub use memory::{MemoryStore, MemoryStores};
