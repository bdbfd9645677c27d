//! # State Store
//!
//! Typed access to the objects the reconciler reads and writes.
//!
//! The reconciler never talks to `kube::Api` directly. It goes through
//! [`ObjectStore`] (get / create / replace / delete per kind) and
//! [`InstanceStatusWriter`], so the same convergence logic runs against the
//! Kubernetes API ([`KubeStore`]) and against the in-memory [`MemoryStore`]
//! used by tests.

mod api;
mod memory;

pub use api::KubeStore;
pub use memory::{MemoryStore, Operation, Verb};

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::crd::{Instance, InstanceStatus};

/// Any namespaced, statically typed Kubernetes object the store can hold
pub trait StoredObject:
    kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Kind name used in logs, errors and metrics
    fn kind_name() -> String {
        Self::kind(&()).to_string()
    }
}

impl<T> StoredObject for T where
    T: kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Errors returned by a state store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("{kind} {name} was modified concurrently")]
    Conflict { kind: String, name: String },
    #[error("{kind} object has no name")]
    MissingName { kind: String },
    #[error("API rejected the request ({code}): {message}")]
    Rejected { code: u16, message: String },
    #[error("API unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to serialize object: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether retrying the same request may succeed without a spec change
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::Unavailable(_) | StoreError::NotFound { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Get / create / replace / delete for one object kind
///
/// `get` reports absence as `Ok(None)`. `replace` sends the whole object and
/// fails with [`StoreError::Conflict`] when the object changed since it was read.
#[async_trait]
pub trait ObjectStore<K: StoredObject>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>;

    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError>;

    async fn replace(&self, namespace: &str, object: &K) -> Result<K, StoreError>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

/// Writes the status subresource of an Instance
#[async_trait]
pub trait InstanceStatusWriter: Send + Sync {
    async fn patch_instance_status(
        &self,
        namespace: &str,
        name: &str,
        status: &InstanceStatus,
    ) -> Result<(), StoreError>;
}

/// Everything the reconciler needs from the cluster
pub trait ClusterStore:
    ObjectStore<Instance>
    + ObjectStore<PersistentVolumeClaim>
    + ObjectStore<Pod>
    + ObjectStore<Service>
    + ObjectStore<Ingress>
    + InstanceStatusWriter
{
}

impl<T> ClusterStore for T where
    T: ObjectStore<Instance>
        + ObjectStore<PersistentVolumeClaim>
        + ObjectStore<Pod>
        + ObjectStore<Service>
        + ObjectStore<Ingress>
        + InstanceStatusWriter
{
}
