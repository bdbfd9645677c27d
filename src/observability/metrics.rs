//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `home_assistant_reconciliations_total` - Total number of reconciliations
//! - `home_assistant_reconciliation_errors_total` - Total number of reconciliation errors
//! - `home_assistant_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `home_assistant_dependent_operations_total` - Dependent create/update/delete/none by kind
//! - `home_assistant_dependent_failures_total` - Failed dependent steps by kind
//! - `home_assistant_teardowns_total` - Teardowns of deleted Instances

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

use crate::controller::reconciler::types::{DependentKind, StepOutcome};

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "home_assistant_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "home_assistant_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "home_assistant_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static DEPENDENT_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "home_assistant_dependent_operations_total",
            "Total number of dependent steps by kind and action",
        ),
        &["kind", "action"],
    )
    .expect("Failed to create DEPENDENT_OPERATIONS_TOTAL metric - this should never happen")
});

static DEPENDENT_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "home_assistant_dependent_failures_total",
            "Total number of failed dependent steps by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create DEPENDENT_FAILURES_TOTAL metric - this should never happen")
});

static TEARDOWNS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "home_assistant_teardowns_total",
        "Total number of teardowns of deleted Instances",
    )
    .expect("Failed to create TEARDOWNS_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(DEPENDENT_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEPENDENT_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TEARDOWNS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_dependent_operation(kind: DependentKind, outcome: StepOutcome) {
    DEPENDENT_OPERATIONS_TOTAL
        .with_label_values(&[kind.as_str(), outcome.as_str()])
        .inc();
}

pub fn increment_dependent_failure(kind: DependentKind) {
    DEPENDENT_FAILURES_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc();
}

pub fn increment_teardowns() {
    TEARDOWNS_TOTAL.inc();
}

/// Encode every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // This should not panic - metrics should register successfully
        assert!(register_metrics().is_ok());
        let text = gather_text().unwrap();
        assert!(text.contains("home_assistant_reconciliations_total"));
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        let after = RECONCILIATIONS_TOTAL.get();
        assert!(after > before);
    }

    #[test]
    fn test_increment_reconciliation_errors() {
        let before = RECONCILIATION_ERRORS_TOTAL.get();
        increment_reconciliation_errors();
        let after = RECONCILIATION_ERRORS_TOTAL.get();
        assert!(after > before);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        let before = RECONCILIATION_DURATION.get_sample_count();
        observe_reconciliation_duration(1.5);
        assert!(RECONCILIATION_DURATION.get_sample_count() > before);
    }

    #[test]
    fn test_dependent_counters_are_labelled() {
        let counter = DEPENDENT_OPERATIONS_TOTAL.with_label_values(&["pod", "update"]);
        let before = counter.get();
        increment_dependent_operation(DependentKind::Pod, StepOutcome::Updated);
        assert!(counter.get() > before);

        let failures = DEPENDENT_FAILURES_TOTAL.with_label_values(&["ingress"]);
        let before = failures.get();
        increment_dependent_failure(DependentKind::Ingress);
        assert!(failures.get() > before);
    }
}
