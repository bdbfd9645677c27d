//! Common test utilities for reconciler integration tests
//!
//! Builds a [`Reconciler`] on top of an in-memory store so scenarios run
//! without a cluster. Every helper returns the store as well, so tests can
//! seed objects, inject faults and inspect the recorded calls.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::Arc;

use home_assistant_operator::config::ControllerConfig;
use home_assistant_operator::controller::reconciler::store::{ClusterStore, MemoryStore, Operation};
use home_assistant_operator::controller::reconciler::{InstanceKey, Reconciler};
use home_assistant_operator::crd::{IngressConfig, Instance, InstanceSpec};

pub const NAMESPACE: &str = "home";

/// An Instance as a user would submit it, before the API server assigns a uid
pub fn instance(name: &str) -> Instance {
    let mut instance = Instance::new(name, InstanceSpec::default());
    instance.metadata.namespace = Some(NAMESPACE.to_string());
    instance
}

pub fn with_ingress(mut instance: Instance, host: &str) -> Instance {
    instance.spec.ingress = IngressConfig {
        enabled: true,
        host: host.to_string(),
        secret_name: format!("{}-tls", instance.metadata.name.as_deref().unwrap_or_default()),
        ingress_class_name: Some("nginx".to_string()),
    };
    instance
}

pub fn key(name: &str) -> InstanceKey {
    InstanceKey::new(NAMESPACE, name)
}

/// Reconciler with default configuration over a fresh store
pub fn setup() -> (Arc<MemoryStore>, Reconciler) {
    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn ClusterStore> = store.clone();
    let reconciler = Reconciler::new(shared, &ControllerConfig::default());
    (store, reconciler)
}

/// Mutations other than status writes, as `(verb, kind, name)` strings
pub async fn dependent_mutations(store: &MemoryStore) -> Vec<String> {
    store
        .mutations()
        .await
        .into_iter()
        .filter(|op| op.kind != "Instance")
        .map(|op: Operation| format!("{} {} {}", op.verb, op.kind, op.name))
        .collect()
}
