//! # Desired State
//!
//! Pure functions that turn an `Instance` into the desired representation of
//! each dependent. Nothing here performs I/O; the only failure is a malformed
//! storage size.

mod claim;
mod ingress;
pub mod labels;
mod pod;
mod quantity;
mod service;

pub use claim::desired_claim;
pub use ingress::desired_ingress;
pub use labels::{claim_name, dependent_labels, effective_version, identity_labels};
pub use pod::desired_pod;
pub use quantity::{parse_storage_size, QuantityError};
pub use service::desired_service;
