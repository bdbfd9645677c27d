//! Home Assistant Operator Library
//!
//! Core functionality for the Home Assistant operator: the `Instance` custom
//! resource, the desired-state builder for its dependents, the convergence
//! engine and the controller runtime that drives it.
//! Tests are included in the module files and under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use home_assistant_operator::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
