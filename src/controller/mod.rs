//! # Controller
//!
//! Reconciliation of `Instance` resources and the HTTP server for probes and
//! metrics.

pub mod backoff;
pub mod reconciler;
pub mod server;
