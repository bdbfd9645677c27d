//! # Status
//!
//! Reports the outcome of a reconciliation on the Instance status.
//!
//! | outcome | phase | reason |
//! |---|---|---|
//! | every dependent converged | `Created` | `Reconciled` |
//! | only transient store faults | `Pending` | `DependentFailed` |
//! | invalid storage size | `Failed` | `InvalidSpec` |
//! | any other failure | `Failed` | `DependentFailed` |
//!
//! The write is skipped when phase, reason, message and observed generation
//! already match, so a converged Instance does not generate watch events.

use tracing::{debug, warn};

use crate::controller::reconciler::store::ClusterStore;
use crate::controller::reconciler::types::{DependentError, DependentFailure};
use crate::crd::{Condition, Instance, InstancePhase, InstanceStatus};

pub const REASON_RECONCILED: &str = "Reconciled";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";
pub const REASON_DEPENDENT_FAILED: &str = "DependentFailed";

const CONDITION_READY: &str = "Ready";

/// Status describing the given failures (none means converged)
pub fn compute_status(instance: &Instance, failures: &[DependentFailure]) -> InstanceStatus {
    let (phase, reason, message) = if failures.is_empty() {
        (
            InstancePhase::Created,
            REASON_RECONCILED,
            "All dependents are up to date".to_string(),
        )
    } else {
        let invalid_spec = failures
            .iter()
            .any(|f| matches!(f.error, DependentError::InvalidSpec(_)));
        let all_transient = failures.iter().all(|f| f.error.is_transient());
        let message = failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        if invalid_spec {
            (InstancePhase::Failed, REASON_INVALID_SPEC, message)
        } else if all_transient {
            (InstancePhase::Pending, REASON_DEPENDENT_FAILED, message)
        } else {
            (InstancePhase::Failed, REASON_DEPENDENT_FAILED, message)
        }
    };

    let now = chrono::Utc::now().to_rfc3339();
    let ready = phase == InstancePhase::Created;
    InstanceStatus {
        phase: Some(phase),
        message: Some(message.clone()),
        reason: Some(reason.to_string()),
        observed_generation: instance.metadata.generation,
        last_reconcile_time: Some(now.clone()),
        conditions: vec![Condition {
            r#type: CONDITION_READY.to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            last_transition_time: Some(now),
            reason: Some(reason.to_string()),
            message: Some(message),
        }],
    }
}

/// Write `status` unless the Instance already reports the same outcome
///
/// Returns whether a write was issued. Failures are logged, not returned.
pub async fn report_status<S>(store: &S, instance: &Instance, status: &InstanceStatus) -> bool
where
    S: ClusterStore + ?Sized,
{
    if instance
        .status
        .as_ref()
        .is_some_and(|current| current.same_outcome(status))
    {
        debug!("Skipping status update - outcome unchanged");
        return false;
    }

    let namespace = instance.metadata.namespace.as_deref().unwrap_or_default();
    let name = instance.metadata.name.as_deref().unwrap_or_default();
    match store.patch_instance_status(namespace, name, status).await {
        Ok(()) => {
            debug!(
                phase = ?status.phase,
                reason = status.reason.as_deref().unwrap_or_default(),
                "Updated Instance status"
            );
            true
        }
        Err(e) => {
            warn!("Failed to update status for Instance {}/{}: {}", namespace, name, e);
            false
        }
    }
}
