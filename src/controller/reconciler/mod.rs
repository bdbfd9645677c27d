//! # Reconciler
//!
//! Core reconciliation logic for `Instance` resources.
//!
//! The reconciler:
//! - Builds the desired claim, pod, service and ingress from the Instance spec
//! - Converges each of them independently against the live cluster state
//! - Tears the dependents down when the Instance is gone
//! - Updates the Instance status with the result
//!
//! ## Reconciliation Flow
//!
//! 1. Load the Instance (present or absent)
//! 2. Absent: delete ingress, service, pod and claim
//! 3. Present: converge claim, pod, service, ingress in that order
//! 4. Update status

pub mod converge;
pub mod desired;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod teardown;
pub mod types;

// Re-export public API
pub use reconcile::{load_instance, reconcile, reconcile_deleted, InstanceState};
pub use teardown::teardown;
pub use types::{
    BackoffState, DependentError, DependentFailure, DependentKind, InstanceKey, Reconciler,
    ReconcilerError, StepOutcome,
};
