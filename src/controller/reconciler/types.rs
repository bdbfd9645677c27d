//! # Types
//!
//! Core types for the reconciler.

use std::collections::HashMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use crate::config::{ControllerConfig, WorkloadDefaults};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::desired::QuantityError;
use crate::controller::reconciler::store::{ClusterStore, StoreError};

/// Namespaced identity of an Instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    pub namespace: String,
    pub name: String,
}

impl InstanceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The four resource kinds an Instance owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependentKind {
    VolumeClaim,
    Pod,
    Service,
    Ingress,
}

impl DependentKind {
    /// Convergence order
    pub const CONVERGE_ORDER: [DependentKind; 4] = [
        DependentKind::VolumeClaim,
        DependentKind::Pod,
        DependentKind::Service,
        DependentKind::Ingress,
    ];

    /// Teardown order, the reverse of convergence
    pub const TEARDOWN_ORDER: [DependentKind; 4] = [
        DependentKind::Ingress,
        DependentKind::Service,
        DependentKind::Pod,
        DependentKind::VolumeClaim,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DependentKind::VolumeClaim => "volume-claim",
            DependentKind::Pod => "pod",
            DependentKind::Service => "service",
            DependentKind::Ingress => "ingress",
        }
    }
}

impl fmt::Display for DependentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one convergence or teardown step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

impl StepOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Created => "create",
            StepOutcome::Updated => "update",
            StepOutcome::Deleted => "delete",
            StepOutcome::Unchanged => "none",
        }
    }

    pub fn is_mutation(&self) -> bool {
        *self != StepOutcome::Unchanged
    }
}

/// Why a single dependent could not be converged
#[derive(Debug, Error)]
pub enum DependentError {
    #[error("invalid spec: {0}")]
    InvalidSpec(#[from] QuantityError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DependentError {
    /// Whether a retry without a spec change may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            DependentError::InvalidSpec(_) => false,
            DependentError::Store(e) => e.is_transient(),
        }
    }
}

/// A failed dependent step
#[derive(Debug, Error)]
#[error("{kind}: {error}")]
pub struct DependentFailure {
    pub kind: DependentKind,
    #[source]
    pub error: DependentError,
}

fn join_failures(failures: &[DependentFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Failed to read Instance {key}: {source}")]
    InstanceLookup {
        key: InstanceKey,
        #[source]
        source: StoreError,
    },
    #[error("Dependents failed to converge: {}", join_failures(.failures))]
    DependentsFailed { failures: Vec<DependentFailure> },
    #[error("Instance object has no name or namespace")]
    MissingObjectKey,
}

impl ReconcilerError {
    /// Kinds named by a `DependentsFailed` error
    pub fn failed_kinds(&self) -> Vec<DependentKind> {
        match self {
            ReconcilerError::DependentsFailed { failures } => {
                failures.iter().map(|f| f.kind).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_seconds, max_seconds),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

/// Number of locks Instance keys are spread over
const KEY_LOCK_STRIPES: usize = 64;

/// Shared reconciliation context
#[derive(Clone)]
pub struct Reconciler {
    pub store: Arc<dyn ClusterStore>,
    pub workload: WorkloadDefaults,
    pub resync_interval: Duration,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
    // Backoff state per resource (identified by namespace/name)
    // Owned by the error policy, dropped on successful reconciliation
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    // Striped per-key locks; two passes over the same Instance never overlap
    key_locks: Arc<[tokio::sync::Mutex<()>]>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("workload", &self.workload)
            .field("resync_interval", &self.resync_interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(store: Arc<dyn ClusterStore>, config: &ControllerConfig) -> Self {
        Self {
            store,
            workload: config.workload.clone(),
            resync_interval: config.resync_interval(),
            backoff_min_secs: config.backoff_min_secs,
            backoff_max_secs: config.backoff_max_secs,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            key_locks: (0..KEY_LOCK_STRIPES)
                .map(|_| tokio::sync::Mutex::new(()))
                .collect(),
        }
    }

    /// Wait for exclusive access to `key`
    ///
    /// Keys hashing to the same stripe share a lock, so unrelated Instances may
    /// occasionally wait on each other.
    pub async fn lock_key(&self, key: &InstanceKey) -> tokio::sync::MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let stripe = usize::try_from(hasher.finish() % KEY_LOCK_STRIPES as u64).unwrap_or_default();
        self.key_locks[stripe].lock().await
    }

    /// Forget the error backoff for a resource after it reconciled cleanly
    ///
    /// The entry is removed, so deleted Instances do not leave state behind.
    pub fn reset_backoff(&self, key: &InstanceKey) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(&key.to_string());
        }
    }

    /// Number of resources currently backing off
    pub fn backoff_len(&self) -> usize {
        self.backoff_states.lock().map(|s| s.len()).unwrap_or_default()
    }

    /// Record a failure for a resource and return the delay before the retry
    pub fn next_backoff(&self, key: &InstanceKey) -> Option<(u64, u32)> {
        let mut states = self.backoff_states.lock().ok()?;
        let state = states
            .entry(key.to_string())
            .or_insert_with(|| BackoffState::new(self.backoff_min_secs, self.backoff_max_secs));
        state.increment_error();
        Some((state.backoff.next_backoff_seconds(), state.error_count))
    }
}
