//! # Convergence Engine
//!
//! Brings each dependent of a present Instance in line with its desired state.
//!
//! Every step is split in three:
//! 1. **Observe** - fetch the dependent by its derived name ([`Observed`])
//! 2. **Plan** - decide what to do, purely ([`Plan`])
//! 3. **Apply** - issue at most one store mutation
//!
//! Per-kind policy:
//! - Volume claim: created once, never mutated afterwards
//! - Pod / Service: created when missing, updated when the overlay changes them
//! - Ingress: as above when enabled; deleted when disabled and present
//!
//! Steps run in the order claim, pod, service, ingress. A failing step never
//! prevents the later ones from running.

pub mod overlay;

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use self::overlay::Overlay;
use crate::config::WorkloadDefaults;
use crate::controller::reconciler::desired::{
    claim_name, desired_claim, desired_ingress, desired_pod, desired_service, QuantityError,
};
use crate::controller::reconciler::store::{ClusterStore, ObjectStore, StoredObject};
use crate::controller::reconciler::types::{
    DependentError, DependentFailure, DependentKind, StepOutcome,
};
use crate::crd::Instance;
use crate::observability;

/// Live state of one dependent
#[derive(Debug, Clone, PartialEq)]
pub enum Observed<K> {
    Missing,
    Present(K),
}

impl<K> From<Option<K>> for Observed<K> {
    fn from(object: Option<K>) -> Self {
        match object {
            Some(object) => Observed::Present(object),
            None => Observed::Missing,
        }
    }
}

/// What a step will do to one dependent
#[derive(Debug, Clone, PartialEq)]
pub enum Plan<K> {
    /// Create the object
    Create(K),
    /// Replace the live object with this merged one
    Update(K),
    /// Delete the object with this name
    Delete(String),
    Noop,
}

/// Claims are create-only
///
/// `desired` is only built when the claim is missing, so a size that stopped
/// parsing after creation has no effect.
pub fn plan_claim<F>(
    observed: Observed<PersistentVolumeClaim>,
    desired: F,
) -> Result<Plan<PersistentVolumeClaim>, QuantityError>
where
    F: FnOnce() -> Result<PersistentVolumeClaim, QuantityError>,
{
    match observed {
        Observed::Missing => Ok(Plan::Create(desired()?)),
        Observed::Present(_) => Ok(Plan::Noop),
    }
}

/// Create when missing, update when the overlay changes the live object
pub fn plan_mutable<K>(observed: Observed<K>, desired: K) -> Plan<K>
where
    K: Overlay + Clone + PartialEq,
{
    match observed {
        Observed::Missing => Plan::Create(desired),
        Observed::Present(live) => {
            let mut merged = live.clone();
            merged.overlay(&desired);
            if merged == live {
                Plan::Noop
            } else {
                Plan::Update(merged)
            }
        }
    }
}

/// `desired` is `None` when the ingress is disabled
pub fn plan_ingress(observed: Observed<Ingress>, desired: Option<Ingress>) -> Plan<Ingress> {
    match (desired, observed) {
        (Some(desired), observed) => plan_mutable(observed, desired),
        (None, Observed::Missing) => Plan::Noop,
        (None, Observed::Present(live)) => Plan::Delete(live.name_any()),
    }
}

/// Observe the dependent `name` of kind `K`
pub async fn observe<K, S>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<Observed<K>, DependentError>
where
    K: StoredObject,
    S: ObjectStore<K> + ?Sized,
{
    Ok(store.get(namespace, name).await?.into())
}

/// Execute a plan against the store
///
/// A delete that races with another deleter is reported as `Unchanged`.
pub async fn apply<K, S>(
    store: &S,
    namespace: &str,
    plan: Plan<K>,
) -> Result<StepOutcome, DependentError>
where
    K: StoredObject,
    S: ObjectStore<K> + ?Sized,
{
    match plan {
        Plan::Create(object) => {
            store.create(namespace, &object).await?;
            Ok(StepOutcome::Created)
        }
        Plan::Update(object) => {
            store.replace(namespace, &object).await?;
            Ok(StepOutcome::Updated)
        }
        Plan::Delete(name) => match store.delete(namespace, &name).await {
            Ok(()) => Ok(StepOutcome::Deleted),
            Err(e) if e.is_not_found() => Ok(StepOutcome::Unchanged),
            Err(e) => Err(e.into()),
        },
        Plan::Noop => Ok(StepOutcome::Unchanged),
    }
}

/// Outcome of converging every dependent of one Instance
#[derive(Debug, Default)]
pub struct ConvergenceReport {
    pub outcomes: Vec<(DependentKind, StepOutcome)>,
    pub failures: Vec<DependentFailure>,
}

impl ConvergenceReport {
    fn record(&mut self, kind: DependentKind, result: Result<StepOutcome, DependentError>) {
        match result {
            Ok(outcome) => {
                if outcome.is_mutation() {
                    info!(dependent.kind = %kind, action = outcome.as_str(), "Dependent converged");
                } else {
                    debug!(dependent.kind = %kind, "Dependent already up to date");
                }
                observability::metrics::increment_dependent_operation(kind, outcome);
                self.outcomes.push((kind, outcome));
            }
            Err(error) => {
                warn!(dependent.kind = %kind, error = %error, "Failed to converge dependent");
                observability::metrics::increment_dependent_failure(kind);
                self.failures.push(DependentFailure { kind, error });
            }
        }
    }

    pub fn is_converged(&self) -> bool {
        self.failures.is_empty()
    }

    /// Outcome for `kind`, if its step succeeded
    pub fn outcome(&self, kind: DependentKind) -> Option<StepOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| *outcome)
    }
}

async fn converge_claim<S>(store: &S, instance: &Instance) -> Result<StepOutcome, DependentError>
where
    S: ObjectStore<PersistentVolumeClaim> + ?Sized,
{
    let namespace = instance.namespace().unwrap_or_default();
    let observed = observe(store, &namespace, &claim_name(&instance.name_any())).await?;
    let plan = plan_claim(observed, || desired_claim(instance))?;
    apply(store, &namespace, plan).await
}

async fn converge_pod<S>(
    store: &S,
    instance: &Instance,
    defaults: &WorkloadDefaults,
) -> Result<StepOutcome, DependentError>
where
    S: ObjectStore<Pod> + ?Sized,
{
    let namespace = instance.namespace().unwrap_or_default();
    let observed = observe(store, &namespace, &instance.name_any()).await?;
    let plan = plan_mutable(observed, desired_pod(instance, defaults));
    apply(store, &namespace, plan).await
}

async fn converge_service<S>(store: &S, instance: &Instance) -> Result<StepOutcome, DependentError>
where
    S: ObjectStore<Service> + ?Sized,
{
    let namespace = instance.namespace().unwrap_or_default();
    let observed = observe(store, &namespace, &instance.name_any()).await?;
    let plan = plan_mutable(observed, desired_service(instance));
    apply(store, &namespace, plan).await
}

async fn converge_ingress<S>(store: &S, instance: &Instance) -> Result<StepOutcome, DependentError>
where
    S: ObjectStore<Ingress> + ?Sized,
{
    let namespace = instance.namespace().unwrap_or_default();
    let observed = observe(store, &namespace, &instance.name_any()).await?;
    let plan = plan_ingress(observed, desired_ingress(instance));
    apply(store, &namespace, plan).await
}

/// Converge claim, pod, service and ingress of a present Instance
pub async fn converge_instance<S>(
    store: &S,
    instance: &Instance,
    defaults: &WorkloadDefaults,
) -> ConvergenceReport
where
    S: ClusterStore + ?Sized,
{
    let mut report = ConvergenceReport::default();
    for kind in DependentKind::CONVERGE_ORDER {
        let result = match kind {
            DependentKind::VolumeClaim => converge_claim(store, instance).await,
            DependentKind::Pod => converge_pod(store, instance, defaults).await,
            DependentKind::Service => converge_service(store, instance).await,
            DependentKind::Ingress => converge_ingress(store, instance).await,
        };
        report.record(kind, result);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::desired::tests::instance;
    use crate::crd::IngressConfig;

    fn enabled_ingress() -> Ingress {
        let mut instance = instance("home");
        instance.spec.ingress = IngressConfig {
            enabled: true,
            host: "home.example.com".to_string(),
            secret_name: "home-tls".to_string(),
            ingress_class_name: None,
        };
        desired_ingress(&instance).unwrap()
    }

    #[test]
    fn test_claim_plan_is_create_only() {
        let desired = desired_claim(&instance("home")).unwrap();
        assert_eq!(
            plan_claim(Observed::Missing, || Ok(desired.clone())).unwrap(),
            Plan::Create(desired.clone())
        );

        let mut resized = instance("home");
        resized.spec.persistence.size = "20Gi".to_string();
        assert_eq!(
            plan_claim(Observed::Present(desired.clone()), || desired_claim(&resized)).unwrap(),
            Plan::Noop
        );
    }

    #[test]
    fn test_claim_plan_only_validates_size_when_creating() {
        let live = desired_claim(&instance("home")).unwrap();
        let mut broken = instance("home");
        broken.spec.persistence.size = "20 GB".to_string();

        assert_eq!(
            plan_claim(Observed::Present(live), || desired_claim(&broken)).unwrap(),
            Plan::Noop
        );
        assert!(plan_claim(Observed::Missing, || desired_claim(&broken)).is_err());
    }

    #[test]
    fn test_mutable_plan() {
        let desired = desired_service(&instance("home"));
        assert_eq!(
            plan_mutable(Observed::Missing, desired.clone()),
            Plan::Create(desired.clone())
        );
        assert_eq!(
            plan_mutable(Observed::Present(desired.clone()), desired.clone()),
            Plan::Noop
        );

        let mut drifted = desired.clone();
        drifted.spec.as_mut().unwrap().type_ = Some("NodePort".to_string());
        match plan_mutable(Observed::Present(drifted), desired) {
            Plan::Update(merged) => {
                assert_eq!(merged.spec.unwrap().type_.as_deref(), Some("ClusterIP"));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_ingress_plan_follows_enabled_flag() {
        let live = enabled_ingress();
        assert_eq!(plan_ingress(Observed::Missing, None), Plan::Noop);
        assert_eq!(
            plan_ingress(Observed::Present(live.clone()), None),
            Plan::Delete("home".to_string())
        );
        assert_eq!(
            plan_ingress(Observed::Missing, Some(live.clone())),
            Plan::Create(live.clone())
        );
        assert_eq!(
            plan_ingress(Observed::Present(live.clone()), Some(live)),
            Plan::Noop
        );
    }
}
