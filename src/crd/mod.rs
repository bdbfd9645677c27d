//! # Custom Resource Definitions
//!
//! CRD types for the Home Assistant operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `Instance` specification, ingress and persistence settings
//! - `status.rs` - Status types for reporting reconciliation outcome

mod spec;
mod status;

pub use spec::{IngressConfig, Instance, InstanceSpec, Persistence};
pub use status::{Condition, InstancePhase, InstanceStatus};
