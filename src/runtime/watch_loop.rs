//! # Watch Loop
//!
//! Controller watch loop that monitors Instance resources, and the dependents
//! they own, and triggers reconciliation when changes are detected.
//!
//! `kube_runtime::Controller` drops Instances from its cache once they are
//! gone, so deletions are picked up by a separate watcher that runs the
//! teardown path for the deleted key. Both paths take the Reconciler's per-key
//! lock, and failed teardowns are retried with the same Fibonacci backoff as
//! failed reconciliations.
//!
//! SIGINT and SIGTERM both stop the loop: the controller drains in-flight
//! reconciliations and the loop exits instead of restarting the watch.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::Api;
use kube::Client;
use kube_runtime::{controller::Action, watcher, Controller};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::constants::{LABEL_MANAGED_BY, MANAGED_BY};
use crate::controller::reconciler::{
    reconcile, reconcile_deleted, InstanceKey, Reconciler, ReconcilerError,
};
use crate::controller::server::ServerState;
use crate::crd::Instance;
use crate::observability;
use crate::runtime::error_policy::{
    handle_reconciliation_error, handle_watch_stream_error, FALLBACK_BACKOFF_SECS,
};

/// Pause after a deletion watcher error before polling the stream again
const DELETION_WATCH_RETRY: std::time::Duration = std::time::Duration::from_secs(5);

/// Build an `Api` scoped to the watched namespace, or cluster-wide
pub fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Key of the Instance a watch event refers to
pub fn instance_key(obj: &Instance) -> Result<InstanceKey, ReconcilerError> {
    match (&obj.metadata.namespace, &obj.metadata.name) {
        (Some(namespace), Some(name)) => Ok(InstanceKey::new(namespace, name)),
        _ => Err(ReconcilerError::MissingObjectKey),
    }
}

/// Label selector limiting dependent watches to objects this operator manages
fn managed_selector() -> String {
    format!("{LABEL_MANAGED_BY}={MANAGED_BY}")
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}

/// Sleep before a watch restart unless shutdown is requested first
///
/// Returns `true` when the loop should exit.
pub async fn wait_for_restart(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    let signalled = tokio::select! {
        Ok(_) = shutdown.wait_for(|stopping| *stopping) => true,
        () = tokio::time::sleep(delay) => false,
    };
    signalled || *shutdown.borrow()
}

/// Run the controller watch loop
///
/// Handles graceful shutdown and restarts the watch when the stream ends.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: ControllerConfig,
) -> Result<(), anyhow::Error> {
    info!("Starting controller watch loop...");
    let namespace = config.watch_namespace.as_deref();
    match namespace {
        Some(ns) => info!("Watching Instances in namespace '{}'", ns),
        None => info!("Watching Instances in all namespaces"),
    }

    let backoff_start_ms = config.backoff_min_secs.saturating_mul(1000);
    let max_backoff_ms = config.backoff_max_secs.saturating_mul(1000);
    let watch_restart_delay_secs = config.watch_restart_delay_secs;
    let backoff_duration_ms = Arc::new(AtomicU64::new(backoff_start_ms));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Initiating graceful shutdown...");
        shutdown_server_state.set_ready(false);
        let _ = shutdown_tx.send(true);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    let deletion_watcher = tokio::spawn(run_deletion_watcher(
        scoped_api::<Instance>(&client, namespace),
        Arc::clone(&reconciler),
    ));

    loop {
        if *shutdown_rx.borrow() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );
        let _watch_guard = watch_span.enter();

        let owned = watcher::Config::default().labels(&managed_selector());
        let backoff_clone = Arc::clone(&backoff_duration_ms);
        let controller_future = Controller::new(
            scoped_api::<Instance>(&client, namespace),
            watcher::Config::default().any_semantic(),
        )
        .owns(
            scoped_api::<PersistentVolumeClaim>(&client, namespace),
            owned.clone(),
        )
        .owns(scoped_api::<Pod>(&client, namespace), owned.clone())
        .owns(scoped_api::<Service>(&client, namespace), owned.clone())
        .owns(scoped_api::<Ingress>(&client, namespace), owned)
        .shutdown_on_signal()
        .run(
            reconcile_instance,
            handle_reconciliation_error,
            Arc::clone(&reconciler),
        )
        .filter_map(move |x| {
            let backoff = Arc::clone(&backoff_clone);
            async move {
                match &x {
                    Ok((obj, _)) => {
                        backoff.store(backoff_start_ms, std::sync::atomic::Ordering::Relaxed);
                        debug!("watch.event.success: {}", obj.name);
                        Some(x)
                    }
                    Err(e) => {
                        let error_string = format!("{e:?}");
                        handle_watch_stream_error(
                            &error_string,
                            &backoff,
                            max_backoff_ms,
                            watch_restart_delay_secs,
                        )
                        .await
                        .map(|()| x)
                    }
                }
            }
        })
        .for_each(|_| futures::future::ready(()));

        controller_future.await;

        // The controller also stops on the signal, possibly before the flag is set
        warn!(
            "Controller watch stream ended, restarting in {} seconds unless shutting down...",
            watch_restart_delay_secs
        );
        if wait_for_restart(&mut shutdown_rx, config.watch_restart_delay()).await {
            info!("Shutdown requested, exiting watch loop");
            break;
        }
    }

    deletion_watcher.abort();
    info!("Controller stopped gracefully");
    Ok(())
}

/// Reconcile function handed to the controller
async fn reconcile_instance(
    obj: Arc<Instance>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let key = instance_key(&obj)?;
    reconcile(&key, &ctx).await
}

/// Tear down a deleted Instance until it succeeds
///
/// Failures wait out the Instance's Fibonacci backoff before the next
/// attempt. Stops early once the Instance exists again.
pub async fn teardown_with_retry(key: InstanceKey, reconciler: Arc<Reconciler>) {
    loop {
        match reconcile_deleted(&key, &reconciler).await {
            Ok(()) => {
                debug!("Teardown of {} complete", key);
                return;
            }
            Err(e) => {
                observability::metrics::increment_reconciliation_errors();
                let (backoff_seconds, error_count) =
                    reconciler.next_backoff(&key).unwrap_or((FALLBACK_BACKOFF_SECS, 0));
                error!(
                    "Teardown of {} failed (attempt {}), retrying in {}s: {}",
                    key, error_count, backoff_seconds, e
                );
                tokio::time::sleep(Duration::from_secs(backoff_seconds)).await;
            }
        }
    }
}

/// Run the teardown path for every Instance delete event
///
/// Each teardown runs in its own task so a retrying one never blocks the
/// stream. The watcher restarts itself on errors; this only returns if the
/// stream ends, which happens on shutdown.
pub async fn run_deletion_watcher(instances: Api<Instance>, reconciler: Arc<Reconciler>) {
    let stream = watcher(instances, watcher::Config::default());
    futures::pin_mut!(stream);

    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Delete(obj)) => {
                let key = match instance_key(&obj) {
                    Ok(key) => key,
                    Err(e) => {
                        warn!("Ignoring delete event: {}", e);
                        continue;
                    }
                };
                info!("🗑️ Instance {} deleted, removing dependents", key);
                tokio::spawn(teardown_with_retry(key, Arc::clone(&reconciler)));
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Deletion watcher error: {}", e);
                tokio::time::sleep(DELETION_WATCH_RETRY).await;
            }
        }
    }
    debug!("Deletion watcher stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::reconciler::store::{ClusterStore, MemoryStore, Verb};
    use crate::crd::InstanceSpec;

    fn setup() -> (Arc<MemoryStore>, Arc<Reconciler>) {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn ClusterStore> = store.clone();
        let reconciler = Arc::new(Reconciler::new(shared, &ControllerConfig::default()));
        (store, reconciler)
    }

    fn seeded(name: &str) -> Instance {
        let mut instance = Instance::new(name, InstanceSpec::default());
        instance.metadata.namespace = Some("home".to_string());
        instance
    }

    #[test]
    fn test_instance_key_requires_namespace_and_name() {
        let mut instance = Instance::new("home", InstanceSpec::default());
        assert!(matches!(
            instance_key(&instance),
            Err(ReconcilerError::MissingObjectKey)
        ));

        instance.metadata.namespace = Some("smart".to_string());
        let key = instance_key(&instance).unwrap();
        assert_eq!(key.to_string(), "smart/home");
    }

    #[tokio::test]
    async fn test_restart_wait_ends_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        assert!(wait_for_restart(&mut rx, Duration::from_secs(3600)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_wait_interrupted_by_late_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(true).unwrap();
        });
        assert!(wait_for_restart(&mut rx, Duration::from_secs(3600)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_wait_elapses_without_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(!wait_for_restart(&mut rx, Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_teardown_is_retried_with_backoff() {
        let (store, reconciler) = setup();
        store.seed(seeded("porch")).await;
        reconcile(&InstanceKey::new("home", "porch"), &reconciler)
            .await
            .unwrap();
        store.remove::<Instance>("home", "porch").await;
        store.fail_next::<Pod>(Verb::Delete, 2).await;

        teardown_with_retry(InstanceKey::new("home", "porch"), Arc::clone(&reconciler)).await;

        assert_eq!(store.count::<Pod>().await, 0);
        assert!(!store.contains::<Service>("home", "porch").await);
        assert_eq!(reconciler.backoff_len(), 0);
    }

    #[tokio::test]
    async fn test_teardown_skips_recreated_instance() {
        let (store, reconciler) = setup();
        store.seed(seeded("shed")).await;
        let key = InstanceKey::new("home", "shed");
        reconcile(&key, &reconciler).await.unwrap();
        store.clear_operations().await;

        teardown_with_retry(key, Arc::clone(&reconciler)).await;

        assert!(store.mutations().await.is_empty());
        assert!(store.contains::<Pod>("home", "shed").await);
    }

    #[test]
    fn test_managed_selector() {
        assert_eq!(
            managed_selector(),
            "app.kubernetes.io/managed-by=home-assistant-operator"
        );
    }
}
