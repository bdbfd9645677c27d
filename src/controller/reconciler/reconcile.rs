//! # Reconciliation Logic
//!
//! Entry point for one reconciliation of one Instance.
//!
//! The dispatcher loads the Instance and branches on an explicit state:
//! - [`InstanceState::Present`]: converge claim, pod, service and ingress,
//!   then report the outcome on the Instance status
//! - [`InstanceState::Absent`]: tear the dependents down
//!
//! Nothing is carried over between invocations; every call starts from the
//! live state. Errors are handled by the error policy, which requeues with
//! backoff.
//!
//! Every pass holds the Reconciler's lock for its key, so the controller and
//! the deletion watcher never work on the same Instance at once.

use std::time::Instant;

use kube_runtime::controller::Action;
use tracing::{debug, error, info, warn, Instrument};

use crate::controller::reconciler::converge::converge_instance;
use crate::controller::reconciler::desired::effective_version;
use crate::controller::reconciler::status::{compute_status, report_status};
use crate::controller::reconciler::store::{ObjectStore, StoreError};
use crate::controller::reconciler::teardown::teardown;
use crate::controller::reconciler::types::{InstanceKey, Reconciler, ReconcilerError};
use crate::crd::Instance;
use crate::observability;

/// Whether the Instance behind a key exists
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceState {
    Present(Box<Instance>),
    Absent,
}

/// Load the Instance for `key`
///
/// Not-found is a state, not an error. Any other store fault is.
pub async fn load_instance(
    ctx: &Reconciler,
    key: &InstanceKey,
) -> Result<InstanceState, ReconcilerError> {
    let lookup: Result<Option<Instance>, StoreError> =
        ObjectStore::<Instance>::get(ctx.store.as_ref(), &key.namespace, &key.name).await;
    match lookup {
        Ok(Some(instance)) => Ok(InstanceState::Present(Box::new(instance))),
        Ok(None) => Ok(InstanceState::Absent),
        Err(e) if e.is_not_found() => Ok(InstanceState::Absent),
        Err(source) => Err(ReconcilerError::InstanceLookup {
            key: key.clone(),
            source,
        }),
    }
}

/// Main reconciliation function
///
/// Returns `Action::requeue(resync_interval)` once every dependent converged
/// (or the teardown completed), and an error otherwise.
pub async fn reconcile(key: &InstanceKey, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let span = tracing::span!(
        tracing::Level::INFO,
        "reconcile",
        resource.name = key.name.as_str(),
        resource.namespace = key.namespace.as_str(),
        resource.kind = "Instance"
    );

    observability::metrics::increment_reconciliations();
    let _serialized = ctx.lock_key(key).await;
    let result = reconcile_internal(key, ctx).instrument(span.clone()).await;
    let _guard = span.enter();
    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    match &result {
        Ok(_) => {
            ctx.reset_backoff(key);
            debug!("Reconciliation of {} finished in {:?}", key, start.elapsed());
        }
        Err(e) => error!("Reconciliation of {} failed: {}", key, e),
    }
    result
}

/// Teardown pass for an Instance reported deleted by a watch event
///
/// Only the teardown branch runs. An Instance recreated under the same name
/// belongs to the controller again and is left alone.
pub async fn reconcile_deleted(key: &InstanceKey, ctx: &Reconciler) -> Result<(), ReconcilerError> {
    let span = tracing::span!(
        tracing::Level::INFO,
        "reconcile.deleted",
        resource.name = key.name.as_str(),
        resource.namespace = key.namespace.as_str(),
        resource.kind = "Instance"
    );
    async {
        let _serialized = ctx.lock_key(key).await;
        match load_instance(ctx, key).await? {
            InstanceState::Present(_) => {
                debug!("Instance {} exists again, skipping teardown", key);
            }
            InstanceState::Absent => {
                teardown(ctx.store.as_ref(), key).await?;
            }
        }
        ctx.reset_backoff(key);
        Ok::<(), ReconcilerError>(())
    }
    .instrument(span)
    .await
}

async fn reconcile_internal(
    key: &InstanceKey,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError> {
    let instance = match load_instance(ctx, key).await? {
        InstanceState::Absent => {
            teardown(ctx.store.as_ref(), key).await?;
            return Ok(Action::await_change());
        }
        InstanceState::Present(instance) => instance,
    };

    if instance.metadata.deletion_timestamp.is_some() {
        // Owner references hand the dependents to the garbage collector
        info!("Instance {} is being deleted, skipping convergence", key);
        return Ok(Action::await_change());
    }

    info!(
        "🔄 Reconciling Instance {} (version: {})",
        key,
        effective_version(&instance)
    );

    let report = converge_instance(ctx.store.as_ref(), &instance, &ctx.workload).await;

    let status = compute_status(&instance, &report.failures);
    report_status(ctx.store.as_ref(), &instance, &status).await;

    if report.is_converged() {
        info!("✅ Instance {} converged", key);
        Ok(Action::requeue(ctx.resync_interval))
    } else {
        warn!(
            "Instance {} has {} failing dependent(s)",
            key,
            report.failures.len()
        );
        Err(ReconcilerError::DependentsFailed {
            failures: report.failures,
        })
    }
}
