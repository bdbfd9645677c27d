//! # In-Memory Store
//!
//! [`ObjectStore`] that keeps objects in a map and records every call.
//!
//! Used by the test suite to drive `reconcile` without a cluster:
//! - objects are stored as JSON keyed by (kind, namespace, name)
//! - `create` assigns a uid and every write bumps `resourceVersion`
//! - `replace` rejects stale `resourceVersion`s with [`StoreError::Conflict`]
//! - faults can be injected per kind and verb
//!
//! This is ephemeral - data does not persist across restarts.
//! Thread-safe using `Arc<Mutex>` for concurrent access.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{InstanceStatusWriter, ObjectStore, StoreError, StoredObject};
use crate::crd::{Instance, InstanceStatus};

/// Store call recorded by [`MemoryStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Create,
    Replace,
    Delete,
    PatchStatus,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verb::Get => "get",
            Verb::Create => "create",
            Verb::Replace => "replace",
            Verb::Delete => "delete",
            Verb::PatchStatus => "patch-status",
        };
        f.write_str(s)
    }
}

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub verb: Verb,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl Operation {
    pub fn is_mutation(&self) -> bool {
        self.verb != Verb::Get
    }
}

type ObjectKey = (String, String, String);

#[derive(Debug, Clone, Copy)]
struct Fault {
    remaining: u32,
    transient: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<ObjectKey, Value>,
    operations: Vec<Operation>,
    faults: HashMap<(String, Verb), Fault>,
    next_uid: u64,
    next_resource_version: u64,
}

impl MemoryState {
    fn record(&mut self, verb: Verb, kind: &str, namespace: &str, name: &str) {
        self.operations.push(Operation {
            verb,
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }

    fn take_fault(&mut self, kind: &str, verb: Verb) -> Option<StoreError> {
        let key = (kind.to_string(), verb);
        let fault = self.faults.get_mut(&key)?;
        fault.remaining -= 1;
        let transient = fault.transient;
        if fault.remaining == 0 {
            self.faults.remove(&key);
        }
        Some(if transient {
            StoreError::Unavailable(format!("injected {verb} fault for {kind}"))
        } else {
            StoreError::Rejected {
                code: 422,
                message: format!("injected {verb} rejection for {kind}"),
            }
        })
    }

    fn uid(&mut self) -> String {
        self.next_uid += 1;
        format!("00000000-0000-4000-8000-{:012}", self.next_uid)
    }

    fn resource_version(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }
}

/// In-memory [`super::ClusterStore`] with call recording and fault injection
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

fn key<K: StoredObject>(namespace: &str, name: &str) -> ObjectKey {
    (K::kind_name(), namespace.to_string(), name.to_string())
}

fn decode<K: StoredObject>(value: &Value) -> Result<K, StoreError> {
    Ok(serde_json::from_value(value.clone())?)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an object into the store without recording an operation
    ///
    /// Overwriting an existing object keeps its uid and bumps `generation`,
    /// the way an edit through the API would.
    pub async fn seed<K: StoredObject>(&self, mut object: K) -> K {
        let mut state = self.state.lock().await;
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();
        let existing = state
            .objects
            .get(&key::<K>(&namespace, &name))
            .and_then(|v| decode::<K>(v).ok());

        let uid = match existing.as_ref().and_then(|e| e.meta().uid.clone()) {
            Some(uid) => uid,
            None => object.meta().uid.clone().unwrap_or_else(|| state.uid()),
        };
        let generation = match existing.as_ref() {
            Some(e) => e.meta().generation.unwrap_or(1) + 1,
            None => object.meta().generation.unwrap_or(1),
        };
        let resource_version = state.resource_version();

        let meta = object.meta_mut();
        meta.namespace = Some(namespace.clone());
        meta.uid = Some(uid);
        meta.generation = Some(generation);
        meta.resource_version = Some(resource_version);

        if let Ok(value) = serde_json::to_value(&object) {
            state.objects.insert(key::<K>(&namespace, &name), value);
        }
        object
    }

    /// Remove an object without recording an operation
    pub async fn remove<K: StoredObject>(&self, namespace: &str, name: &str) -> bool {
        let mut state = self.state.lock().await;
        state.objects.remove(&key::<K>(namespace, name)).is_some()
    }

    /// Read an object without recording an operation
    pub async fn object<K: StoredObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let state = self.state.lock().await;
        state
            .objects
            .get(&key::<K>(namespace, name))
            .and_then(|v| decode(v).ok())
    }

    pub async fn contains<K: StoredObject>(&self, namespace: &str, name: &str) -> bool {
        let state = self.state.lock().await;
        state.objects.contains_key(&key::<K>(namespace, name))
    }

    /// Number of stored objects of kind `K`
    pub async fn count<K: StoredObject>(&self) -> usize {
        let kind = K::kind_name();
        let state = self.state.lock().await;
        state.objects.keys().filter(|(k, _, _)| *k == kind).count()
    }

    /// Every call recorded since creation or the last [`Self::clear_operations`]
    pub async fn operations(&self) -> Vec<Operation> {
        self.state.lock().await.operations.clone()
    }

    /// Recorded calls other than `get`
    pub async fn mutations(&self) -> Vec<Operation> {
        self.state
            .lock()
            .await
            .operations
            .iter()
            .filter(|op| op.is_mutation())
            .cloned()
            .collect()
    }

    pub async fn clear_operations(&self) {
        self.state.lock().await.operations.clear();
    }

    /// Fail the next `times` calls of `verb` on kind `K` with a transient error
    pub async fn fail_next<K: StoredObject>(&self, verb: Verb, times: u32) {
        self.inject::<K>(verb, times, true).await;
    }

    /// Reject the next `times` calls of `verb` on kind `K` with a permanent error
    pub async fn reject_next<K: StoredObject>(&self, verb: Verb, times: u32) {
        self.inject::<K>(verb, times, false).await;
    }

    async fn inject<K: StoredObject>(&self, verb: Verb, times: u32, transient: bool) {
        if times == 0 {
            return;
        }
        let mut state = self.state.lock().await;
        state.faults.insert(
            (K::kind_name(), verb),
            Fault {
                remaining: times,
                transient,
            },
        );
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore
where
    K: StoredObject,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        let kind = K::kind_name();
        let mut state = self.state.lock().await;
        state.record(Verb::Get, &kind, namespace, name);
        if let Some(err) = state.take_fault(&kind, Verb::Get) {
            return Err(err);
        }
        state
            .objects
            .get(&key::<K>(namespace, name))
            .map(decode::<K>)
            .transpose()
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let kind = K::kind_name();
        let name = object
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::MissingName { kind: kind.clone() })?;
        let mut state = self.state.lock().await;
        state.record(Verb::Create, &kind, namespace, &name);
        if let Some(err) = state.take_fault(&kind, Verb::Create) {
            return Err(err);
        }
        let object_key = key::<K>(namespace, &name);
        if state.objects.contains_key(&object_key) {
            return Err(StoreError::AlreadyExists { kind, name });
        }

        let mut created = object.clone();
        let uid = state.uid();
        let resource_version = state.resource_version();
        let meta = created.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.uid = Some(uid);
        meta.resource_version = Some(resource_version);
        state.objects.insert(object_key, serde_json::to_value(&created)?);
        Ok(created)
    }

    async fn replace(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let kind = K::kind_name();
        let name = object
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::MissingName { kind: kind.clone() })?;
        let mut state = self.state.lock().await;
        state.record(Verb::Replace, &kind, namespace, &name);
        if let Some(err) = state.take_fault(&kind, Verb::Replace) {
            return Err(err);
        }
        let object_key = key::<K>(namespace, &name);
        let current: K = match state.objects.get(&object_key) {
            Some(value) => decode(value)?,
            None => return Err(StoreError::NotFound { kind, name }),
        };
        if let Some(sent) = object.meta().resource_version.as_deref() {
            if current.meta().resource_version.as_deref() != Some(sent) {
                return Err(StoreError::Conflict { kind, name });
            }
        }

        let mut replaced = object.clone();
        let resource_version = state.resource_version();
        let meta = replaced.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.uid = current.meta().uid.clone();
        meta.resource_version = Some(resource_version);
        state
            .objects
            .insert(object_key, serde_json::to_value(&replaced)?);
        Ok(replaced)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let kind = K::kind_name();
        let mut state = self.state.lock().await;
        state.record(Verb::Delete, &kind, namespace, name);
        if let Some(err) = state.take_fault(&kind, Verb::Delete) {
            return Err(err);
        }
        match state.objects.remove(&key::<K>(namespace, name)) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                kind,
                name: name.to_string(),
            }),
        }
    }
}

#[async_trait]
impl InstanceStatusWriter for MemoryStore {
    async fn patch_instance_status(
        &self,
        namespace: &str,
        name: &str,
        status: &InstanceStatus,
    ) -> Result<(), StoreError> {
        let kind = Instance::kind_name();
        let mut state = self.state.lock().await;
        state.record(Verb::PatchStatus, &kind, namespace, name);
        if let Some(err) = state.take_fault(&kind, Verb::PatchStatus) {
            return Err(err);
        }
        let status_value = serde_json::to_value(status)?;
        let resource_version = state.resource_version();
        let Some(Value::Object(object)) = state.objects.get_mut(&key::<Instance>(namespace, name))
        else {
            return Err(StoreError::NotFound {
                kind,
                name: name.to_string(),
            });
        };
        object.insert("status".to_string(), status_value);
        if let Some(Value::Object(metadata)) = object.get_mut("metadata") {
            metadata.insert("resourceVersion".to_string(), Value::String(resource_version));
        }
        Ok(())
    }
}
