//! # Teardown Tests
//!
//! Dependents are removed once their Instance is gone, every kind is
//! attempted even when one fails, and a repeated teardown is a no-op.

mod common;

use common::{dependent_mutations, instance, key, setup, with_ingress, NAMESPACE};
use home_assistant_operator::controller::reconciler::store::Verb;
use home_assistant_operator::controller::reconciler::{
    reconcile, teardown, DependentKind, ReconcilerError, StepOutcome,
};
use home_assistant_operator::crd::Instance;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube_runtime::controller::Action;

#[tokio::test]
async fn test_absent_instance_removes_every_dependent() {
    let (store, ctx) = setup();
    store
        .seed(with_ingress(instance("patio"), "patio.example.com"))
        .await;
    reconcile(&key("patio"), &ctx).await.unwrap();
    assert_eq!(store.count::<Ingress>().await, 1);

    store.remove::<Instance>(NAMESPACE, "patio").await;
    store.clear_operations().await;

    let action = reconcile(&key("patio"), &ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(
        dependent_mutations(&store).await,
        vec![
            "delete Ingress patio",
            "delete Service patio",
            "delete Pod patio",
            "delete PersistentVolumeClaim patio-config",
        ]
    );
    assert_eq!(store.count::<Ingress>().await, 0);
    assert_eq!(store.count::<Service>().await, 0);
    assert_eq!(store.count::<Pod>().await, 0);
    assert_eq!(store.count::<PersistentVolumeClaim>().await, 0);
}

#[tokio::test]
async fn test_second_teardown_is_a_noop() {
    let (store, ctx) = setup();
    store.seed(instance("yard")).await;
    reconcile(&key("yard"), &ctx).await.unwrap();
    store.remove::<Instance>(NAMESPACE, "yard").await;

    teardown(store.as_ref(), &key("yard")).await.unwrap();
    store.clear_operations().await;

    let outcomes = teardown(store.as_ref(), &key("yard")).await.unwrap();

    assert!(store.mutations().await.is_empty());
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes
        .iter()
        .all(|(_, outcome)| *outcome == StepOutcome::Unchanged));
}

#[tokio::test]
async fn test_teardown_attempts_every_kind_when_one_fails() {
    let (store, ctx) = setup();
    store.seed(instance("pantry")).await;
    reconcile(&key("pantry"), &ctx).await.unwrap();
    store.remove::<Instance>(NAMESPACE, "pantry").await;
    store.reject_next::<Service>(Verb::Delete, 1).await;

    let err = reconcile(&key("pantry"), &ctx).await.unwrap_err();
    ctx.next_backoff(&key("pantry"));

    assert!(matches!(err, ReconcilerError::DependentsFailed { .. }));
    assert_eq!(err.failed_kinds(), vec![DependentKind::Service]);
    assert!(store.contains::<Service>(NAMESPACE, "pantry").await);
    assert!(!store.contains::<Pod>(NAMESPACE, "pantry").await);
    assert!(!store.contains::<PersistentVolumeClaim>(NAMESPACE, "pantry-config").await);

    // The retry finishes the job
    reconcile(&key("pantry"), &ctx).await.unwrap();
    assert_eq!(store.count::<Service>().await, 0);
    assert_eq!(ctx.backoff_len(), 0);
}

#[tokio::test]
async fn test_teardown_leaves_other_instances_alone() {
    let (store, ctx) = setup();
    store.seed(instance("east")).await;
    store.seed(instance("west")).await;
    reconcile(&key("east"), &ctx).await.unwrap();
    reconcile(&key("west"), &ctx).await.unwrap();

    store.remove::<Instance>(NAMESPACE, "east").await;
    reconcile(&key("east"), &ctx).await.unwrap();

    assert!(!store.contains::<Pod>(NAMESPACE, "east").await);
    assert!(store.contains::<Pod>(NAMESPACE, "west").await);
    assert!(store.contains::<PersistentVolumeClaim>(NAMESPACE, "west-config").await);
}
