//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kube_runtime::controller::Action;
use tracing::{error, info, warn};

use crate::controller::reconciler::{InstanceKey, Reconciler, ReconcilerError};
use crate::crd::Instance;
use crate::observability;

/// Requeue delay used when the backoff table cannot be consulted
pub(crate) const FALLBACK_BACKOFF_SECS: u64 = 60;

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per Instance, so one failing Instance never delays
/// another. A successful reconcile resets it.
pub fn handle_reconciliation_error(
    obj: Arc<Instance>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {}", namespace, name, error);
    observability::metrics::increment_reconciliation_errors();

    let key = InstanceKey::new(namespace, name);
    let (backoff_seconds, error_count) = ctx.next_backoff(&key).unwrap_or_else(|| {
        warn!("Failed to lock backoff states, using default backoff");
        (FALLBACK_BACKOFF_SECS, 0)
    });

    let failed = error.failed_kinds();
    if !failed.is_empty() {
        let kinds: Vec<&str> = failed.iter().map(|k| k.as_str()).collect();
        info!("Failing dependents: {}", kinds.join(", "));
    }

    let delay = Duration::from_secs(backoff_seconds);
    let next_trigger_time =
        chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {}, next retry: {})",
        backoff_seconds,
        error_count,
        next_trigger_time.to_rfc3339()
    );

    Action::requeue(delay)
}

/// How a watch stream error should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// 401: credentials or RBAC are gone
    Unauthorized,
    /// 410: resource version expired, the watcher relists
    Expired,
    /// 429: API server is throttling or reinitializing storage
    Throttled,
    /// 404: CRD missing or object vanished between list and get
    NotFound,
    Other,
}

/// Classify a controller stream error by its rendered text
///
/// 404 is checked before 401 because a plain-text 404 body surfaces as a
/// serde error wrapped in `WatchFailed`.
pub fn classify_watch_error(error_string: &str) -> WatchErrorClass {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    if (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found {
        WatchErrorClass::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorClass::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorClass::Throttled
    } else if is_not_found {
        WatchErrorClass::NotFound
    } else {
        WatchErrorClass::Other
    }
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff_ms: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay_secs: u64,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match classify_watch_error(error_string) {
        WatchErrorClass::Unauthorized => {
            error!(
                "❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired"
            );
            error!("   Verify the operator ServiceAccount can still list instances:");
            error!(
                "      kubectl auth can-i list instances.home-assistant.lmatfy.io --as=system:serviceaccount:<namespace>:home-assistant-operator --all-namespaces"
            );
            warn!(
                "⏳ Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay_secs
            );
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
            None
        }
        WatchErrorClass::Expired => {
            warn!("Watch resource version expired (410), watch will restart");
            None
        }
        WatchErrorClass::Throttled => {
            let current_backoff = backoff_ms.load(Ordering::Relaxed);
            warn!(
                "API server throttling (429), backing off for {}ms before restart...",
                current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            let new_backoff = current_backoff.saturating_mul(2).min(max_backoff_ms);
            backoff_ms.store(new_backoff, Ordering::Relaxed);
            None
        }
        WatchErrorClass::NotFound => {
            warn!(
                "Resource not found (404) - the Instance may have been deleted or the CRD is missing. Error: {}",
                error_string
            );
            Some(())
        }
        WatchErrorClass::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
            None
        }
    }
}
