//! # Configuration
//!
//! Operator-level settings loaded from environment variables (populated from a
//! ConfigMap via `envFrom` in the deployment) and optionally overridden by
//! command-line flags.

mod controller;

pub use controller::{ControllerConfig, LogFormat, WorkloadDefaults};
