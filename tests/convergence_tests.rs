//! # Convergence Tests
//!
//! Dependent shapes and per-kind convergence rules as seen through the store:
//! ingress toggling, claim sizing, invalid sizes, label precedence and owner
//! references.

mod common;

use std::collections::BTreeMap;

use common::{dependent_mutations, instance, key, setup, with_ingress, NAMESPACE};
use home_assistant_operator::controller::reconciler::converge::converge_instance;
use home_assistant_operator::controller::reconciler::{
    reconcile, DependentError, DependentKind, StepOutcome,
};
use home_assistant_operator::crd::{Instance, InstancePhase};
use home_assistant_operator::config::WorkloadDefaults;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;

fn requested_storage(claim: &PersistentVolumeClaim) -> String {
    claim
        .spec
        .as_ref()
        .and_then(|s| s.resources.as_ref())
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get("storage"))
        .map(|q| q.0.clone())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_ingress_follows_enabled_flag() {
    let (store, _ctx) = setup();
    let defaults = WorkloadDefaults::default();
    let home = store
        .seed(with_ingress(instance("den"), "den.example.com"))
        .await;

    let report = converge_instance(store.as_ref(), &home, &defaults).await;
    assert!(report.is_converged());
    assert_eq!(report.outcome(DependentKind::Ingress), Some(StepOutcome::Created));

    let ingress = store.object::<Ingress>(NAMESPACE, "den").await.unwrap();
    let spec = ingress.spec.unwrap();
    assert_eq!(spec.ingress_class_name.as_deref(), Some("nginx"));
    let rule = &spec.rules.unwrap()[0];
    assert_eq!(rule.host.as_deref(), Some("den.example.com"));
    let path = &rule.http.as_ref().unwrap().paths[0];
    let backend = path.backend.service.as_ref().unwrap();
    assert_eq!(backend.name, "den");
    assert_eq!(backend.port.as_ref().unwrap().number, Some(8123));
    let tls = &spec.tls.unwrap()[0];
    assert_eq!(tls.secret_name.as_deref(), Some("den-tls"));

    let mut disabled = store.object::<Instance>(NAMESPACE, "den").await.unwrap();
    disabled.spec.ingress.enabled = false;
    let disabled = store.seed(disabled).await;

    let report = converge_instance(store.as_ref(), &disabled, &defaults).await;
    assert_eq!(report.outcome(DependentKind::Ingress), Some(StepOutcome::Deleted));
    assert_eq!(store.count::<Ingress>().await, 0);

    let report = converge_instance(store.as_ref(), &disabled, &defaults).await;
    assert_eq!(
        report.outcome(DependentKind::Ingress),
        Some(StepOutcome::Unchanged)
    );
}

#[tokio::test]
async fn test_claim_defaults_to_one_gibibyte_and_is_never_resized() {
    let (store, ctx) = setup();
    store.seed(instance("office")).await;
    reconcile(&key("office"), &ctx).await.unwrap();

    let claim = store
        .object::<PersistentVolumeClaim>(NAMESPACE, "office-config")
        .await
        .unwrap();
    assert_eq!(requested_storage(&claim), "1Gi");
    assert_eq!(
        claim.spec.as_ref().unwrap().access_modes,
        Some(vec!["ReadWriteOnce".to_string()])
    );

    let mut bigger = store.object::<Instance>(NAMESPACE, "office").await.unwrap();
    bigger.spec.persistence.size = "20Gi".to_string();
    store.seed(bigger).await;
    store.clear_operations().await;

    reconcile(&key("office"), &ctx).await.unwrap();

    assert!(dependent_mutations(&store).await.is_empty());
    let claim = store
        .object::<PersistentVolumeClaim>(NAMESPACE, "office-config")
        .await
        .unwrap();
    assert_eq!(requested_storage(&claim), "1Gi");
}

#[tokio::test]
async fn test_invalid_size_blocks_only_the_claim() {
    let (store, ctx) = setup();
    let mut home = instance("basement");
    home.spec.persistence.size = "lots".to_string();
    store.seed(home).await;

    let err = reconcile(&key("basement"), &ctx).await.unwrap_err();
    assert_eq!(err.failed_kinds(), vec![DependentKind::VolumeClaim]);

    assert_eq!(store.count::<PersistentVolumeClaim>().await, 0);
    assert!(store.contains::<Pod>(NAMESPACE, "basement").await);
    assert!(store.contains::<Service>(NAMESPACE, "basement").await);

    let status = store
        .object::<Instance>(NAMESPACE, "basement")
        .await
        .unwrap()
        .status
        .unwrap();
    assert_eq!(status.phase, Some(InstancePhase::Failed));
    assert_eq!(status.reason.as_deref(), Some("InvalidSpec"));
}

#[tokio::test]
async fn test_invalid_size_never_reaches_the_store() {
    let (store, _ctx) = setup();
    let mut home = instance("hall");
    home.spec.persistence.size = "-5Gi".to_string();
    let home = store.seed(home).await;

    let report = converge_instance(store.as_ref(), &home, &WorkloadDefaults::default()).await;

    let failure = &report.failures[0];
    assert_eq!(failure.kind, DependentKind::VolumeClaim);
    assert!(matches!(failure.error, DependentError::InvalidSpec(_)));
    assert!(store
        .mutations()
        .await
        .iter()
        .all(|op| op.kind != "PersistentVolumeClaim"));
}

#[tokio::test]
async fn test_size_edit_after_claim_creation_is_ignored() {
    let (store, ctx) = setup();
    store.seed(instance("attic")).await;
    reconcile(&key("attic"), &ctx).await.unwrap();

    let mut edited = store.object::<Instance>(NAMESPACE, "attic").await.unwrap();
    edited.spec.persistence.size = "20 GB".to_string();
    store.seed(edited).await;
    store.clear_operations().await;

    reconcile(&key("attic"), &ctx).await.unwrap();

    assert!(dependent_mutations(&store).await.is_empty());
    let claim = store
        .object::<PersistentVolumeClaim>(NAMESPACE, "attic-config")
        .await
        .unwrap();
    assert_eq!(requested_storage(&claim), "1Gi");
    let status = store
        .object::<Instance>(NAMESPACE, "attic")
        .await
        .unwrap()
        .status
        .unwrap();
    assert_eq!(status.phase, Some(InstancePhase::Created));
    assert_eq!(status.reason.as_deref(), Some("Reconciled"));
}

#[tokio::test]
async fn test_identity_labels_win_over_user_labels() {
    let (store, ctx) = setup();
    let mut home = instance("study");
    home.spec.labels = BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "custom".to_string()),
        ("team".to_string(), "automation".to_string()),
    ]);
    home.spec.annotations = BTreeMap::from([("owner".to_string(), "alex".to_string())]);
    home.spec.version = "2024.5.1".to_string();
    store.seed(home).await;

    reconcile(&key("study"), &ctx).await.unwrap();

    let service = store.object::<Service>(NAMESPACE, "study").await.unwrap();
    let labels = service.metadata.labels.unwrap();
    assert_eq!(labels["app.kubernetes.io/name"], "study");
    assert_eq!(labels["app.kubernetes.io/instance"], "study");
    assert_eq!(labels["app.kubernetes.io/managed-by"], "home-assistant-operator");
    assert_eq!(labels["app.kubernetes.io/version"], "2024.5.1");
    assert_eq!(labels["team"], "automation");
    assert_eq!(service.metadata.annotations.unwrap()["owner"], "alex");

    let selector = service.spec.unwrap().selector.unwrap();
    assert_eq!(selector.len(), 2);
    assert_eq!(selector["app.kubernetes.io/name"], "study");
}

#[tokio::test]
async fn test_dependents_are_owned_by_the_instance() {
    let (store, ctx) = setup();
    let home = store.seed(instance("loft")).await;
    let uid = home.metadata.uid.clone().unwrap();

    reconcile(&key("loft"), &ctx).await.unwrap();

    let pod = store.object::<Pod>(NAMESPACE, "loft").await.unwrap();
    let claim = store
        .object::<PersistentVolumeClaim>(NAMESPACE, "loft-config")
        .await
        .unwrap();
    for owners in [pod.metadata.owner_references, claim.metadata.owner_references] {
        let owner = &owners.unwrap()[0];
        assert_eq!(owner.uid, uid);
        assert_eq!(owner.kind, "Instance");
        assert_eq!(owner.name, "loft");
        assert_eq!(owner.controller, Some(true));
    }
}

#[tokio::test]
async fn test_pod_drift_is_repaired_without_dropping_foreign_fields() {
    let (store, ctx) = setup();
    store.seed(instance("nook")).await;
    reconcile(&key("nook"), &ctx).await.unwrap();

    // Someone edits the image and the scheduler has assigned a node
    let mut pod = store.object::<Pod>(NAMESPACE, "nook").await.unwrap();
    let spec = pod.spec.as_mut().unwrap();
    spec.containers[0].image = Some("busybox:latest".to_string());
    spec.node_name = Some("node-1".to_string());
    store.seed(pod).await;
    store.clear_operations().await;

    reconcile(&key("nook"), &ctx).await.unwrap();

    assert_eq!(dependent_mutations(&store).await, vec!["replace Pod nook"]);
    let pod = store.object::<Pod>(NAMESPACE, "nook").await.unwrap();
    let spec = pod.spec.unwrap();
    assert_eq!(
        spec.containers[0].image.as_deref(),
        Some("homeassistant/home-assistant:stable")
    );
    assert_eq!(spec.node_name.as_deref(), Some("node-1"));
}
