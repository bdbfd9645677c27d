//! # Teardown
//!
//! Deletes the dependents of an Instance that no longer exists.
//!
//! Owner references let the garbage collector do the same eventually; the
//! explicit teardown removes the dependents right away and also covers
//! objects created before owner references were set.
//!
//! Order: ingress, service, pod, claim. Every deletion is attempted even when
//! an earlier one failed. Absence is never an error, so a second teardown is
//! a series of lookups and nothing else.

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use tracing::{debug, info, warn};

use crate::controller::reconciler::converge::{apply, observe, Observed, Plan};
use crate::controller::reconciler::desired::claim_name;
use crate::controller::reconciler::store::{ClusterStore, ObjectStore, StoredObject};
use crate::controller::reconciler::types::{
    DependentError, DependentFailure, DependentKind, InstanceKey, ReconcilerError, StepOutcome,
};
use crate::observability;

async fn delete_if_present<K, S>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<StepOutcome, DependentError>
where
    K: StoredObject,
    S: ObjectStore<K> + ?Sized,
{
    let plan = match observe::<K, S>(store, namespace, name).await? {
        Observed::Present(_) => Plan::<K>::Delete(name.to_string()),
        Observed::Missing => Plan::Noop,
    };
    apply(store, namespace, plan).await
}

/// Delete every dependent of the Instance identified by `key`
///
/// Returns the per-kind outcomes, or `DependentsFailed` naming every kind
/// whose deletion failed.
pub async fn teardown<S>(
    store: &S,
    key: &InstanceKey,
) -> Result<Vec<(DependentKind, StepOutcome)>, ReconcilerError>
where
    S: ClusterStore + ?Sized,
{
    info!("Instance {} is gone, tearing down dependents", key);
    observability::metrics::increment_teardowns();

    let namespace = key.namespace.as_str();
    let claim = claim_name(&key.name);
    let mut outcomes = Vec::new();
    let mut failures = Vec::new();

    for kind in DependentKind::TEARDOWN_ORDER {
        let result = match kind {
            DependentKind::Ingress => {
                delete_if_present::<Ingress, S>(store, namespace, &key.name).await
            }
            DependentKind::Service => {
                delete_if_present::<Service, S>(store, namespace, &key.name).await
            }
            DependentKind::Pod => delete_if_present::<Pod, S>(store, namespace, &key.name).await,
            DependentKind::VolumeClaim => {
                delete_if_present::<PersistentVolumeClaim, S>(store, namespace, &claim).await
            }
        };
        match result {
            Ok(outcome) => {
                if outcome == StepOutcome::Deleted {
                    info!(dependent.kind = %kind, action = "delete", "Deleted dependent");
                } else {
                    debug!(dependent.kind = %kind, "Dependent already absent");
                }
                observability::metrics::increment_dependent_operation(kind, outcome);
                outcomes.push((kind, outcome));
            }
            Err(error) => {
                warn!(dependent.kind = %kind, error = %error, "Failed to delete dependent");
                observability::metrics::increment_dependent_failure(kind);
                failures.push(DependentFailure { kind, error });
            }
        }
    }

    if failures.is_empty() {
        Ok(outcomes)
    } else {
        Err(ReconcilerError::DependentsFailed { failures })
    }
}
