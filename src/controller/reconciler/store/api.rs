//! # Kubernetes API Store
//!
//! [`ObjectStore`] backed by `kube::Api`.

use async_trait::async_trait;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

use super::{InstanceStatusWriter, ObjectStore, StoreError, StoredObject};
use crate::crd::{Instance, InstanceStatus};

/// Store that reads and writes through the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api<K: StoredObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

/// Map a `kube::Error` onto the store's error model
///
/// 404 is `NotFound`, 409 is `AlreadyExists` or `Conflict` depending on the
/// reason, 429 and 5xx are `Unavailable`, other API statuses are `Rejected`.
/// Transport-level failures are `Unavailable`.
fn map_kube_error(error: kube::Error, kind: &str, name: &str) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind: kind.to_string(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 429 || api_err.code >= 500 => {
            StoreError::Unavailable(format!("{} ({})", api_err.message, api_err.code))
        }
        kube::Error::Api(api_err) => StoreError::Rejected {
            code: api_err.code,
            message: api_err.message,
        },
        kube::Error::SerdeError(e) => StoreError::Serialization(e),
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn object_name<K: StoredObject>(object: &K) -> Result<String, StoreError> {
    object
        .meta()
        .name
        .clone()
        .ok_or_else(|| StoreError::MissingName {
            kind: K::kind_name(),
        })
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore
where
    K: StoredObject,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        self.api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(e, &K::kind_name(), name))
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let name = object_name(object)?;
        debug!(kind = %K::kind_name(), namespace, name = %name, "Creating object");
        self.api::<K>(namespace)
            .create(&self.post_params(), object)
            .await
            .map_err(|e| map_kube_error(e, &K::kind_name(), &name))
    }

    async fn replace(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let name = object_name(object)?;
        debug!(kind = %K::kind_name(), namespace, name = %name, "Replacing object");
        self.api::<K>(namespace)
            .replace(&name, &self.post_params(), object)
            .await
            .map_err(|e| map_kube_error(e, &K::kind_name(), &name))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        debug!(kind = %K::kind_name(), namespace, name, "Deleting object");
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(e, &K::kind_name(), name))
    }
}

#[async_trait]
impl InstanceStatusWriter for KubeStore {
    async fn patch_instance_status(
        &self,
        namespace: &str,
        name: &str,
        status: &InstanceStatus,
    ) -> Result<(), StoreError> {
        let api: Api<Instance> = self.api(namespace);
        let patch = serde_json::json!({
            "status": status
        });
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        api.patch_status(name, &params, &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(e, "Instance", name))
    }
}
