//! # Object Store
//!
//! The seam between the orchestrator and wherever objects live. The
//! orchestrator only needs two operations: read the current object and
//! create-or-update the desired one.
//!
//! - [`KubeObjectStore`] talks to the Kubernetes API with server-side apply.
//! - [`MemoryObjectStore`] keeps objects in memory (tests and dry runs).

use std::fmt;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use thiserror::Error;

use crate::constants::FIELD_MANAGER;

pub use crate::controller::memory::MemoryObjectStore;

/// Identity of a namespaced object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a rendered object; type, namespace and name must all be set
    pub fn from_object(object: &DynamicObject) -> Result<Self, StoreError> {
        let types = object
            .types
            .as_ref()
            .ok_or_else(|| StoreError::Internal("object has no apiVersion/kind".to_string()))?;
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| StoreError::Internal(format!("{} has no name", types.kind)))?;
        let namespace = object
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| StoreError::Internal(format!("{} {name} has no namespace", types.kind)))?;
        Ok(Self::new(&types.api_version, &types.kind, namespace, name))
    }

    fn gvk(&self) -> GroupVersionKind {
        let (group, version) = match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        };
        GroupVersionKind::gvk(group, version, &self.kind)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Object store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict; retry with fresh state
    #[error("conflict writing {0}")]
    Conflict(String),
    /// Throttled or server-side failure; retry later
    #[error("transient error: {0}")]
    Transient(String),
    /// The pass was cancelled while the call was in flight
    #[error("operation cancelled")]
    Cancelled,
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Internal(String),
}

impl StoreError {
    /// Whether the write may succeed if attempted again
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Transient(_))
    }
}

/// Read current state, write desired state
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Current object, or `None` when it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError>;

    /// Create the object or bring the existing one to the given state
    async fn create_or_update(&self, object: &DynamicObject) -> Result<(), StoreError>;
}

/// Object store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &ObjectKey) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(&key.gvk());
        Api::namespaced_with(self.client.clone(), &key.namespace, &resource)
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError> {
        self.api(key).get_opt(&key.name).await.map_err(classify)
    }

    async fn create_or_update(&self, object: &DynamicObject) -> Result<(), StoreError> {
        let key = ObjectKey::from_object(object)?;
        // Not forced: fields owned by another manager come back as 409
        let params = PatchParams::apply(FIELD_MANAGER);
        self.api(&key)
            .patch(&key.name, &params, &Patch::Apply(object))
            .await
            .map(|_| ())
            .map_err(classify)
    }
}

fn classify(error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 429 || api_err.code >= 500 => {
            StoreError::Transient(format!("{} ({})", api_err.message, api_err.code))
        }
        kube::Error::Api(api_err) if api_err.code == 409 => {
            StoreError::Conflict(format!("{} ({})", api_err.message, api_err.reason))
        }
        other => StoreError::Kube(other),
    }
}
