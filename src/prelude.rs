//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use home_assistant_operator::prelude::*;
//! ```
//!
//! This brings into scope:
//! - CRD types (Instance, InstanceSpec, InstanceStatus, ...)
//! - Reconciler types (Reconciler, ReconcilerError, InstanceKey, ...)
//! - State store traits and the in-memory store
//! - Config types (ControllerConfig, WorkloadDefaults)

pub use crate::crd::*;

pub use crate::controller::reconciler::{
    reconcile, DependentError, DependentFailure, DependentKind, InstanceKey, Reconciler,
    ReconcilerError, StepOutcome,
};

pub use crate::controller::reconciler::store::{
    ClusterStore, InstanceStatusWriter, KubeStore, MemoryStore, ObjectStore, StoreError, Verb,
};

pub use crate::config::{ControllerConfig, WorkloadDefaults};
