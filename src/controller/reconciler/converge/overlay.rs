//! # Overlay
//!
//! Copies the operator-owned fields of a desired object onto the live one.
//!
//! Everything the operator does not own (server defaults, fields added by
//! admission controllers, labels set by other tools) is left alone, so
//! overlaying an unchanged desired object onto its live counterpart is a
//! no-op and the update can be skipped.

use k8s_openapi::api::core::v1::{Container, Pod, Service, Toleration};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::ObjectMeta;

/// Overlay the operator-owned fields of `desired` onto `self`
pub trait Overlay {
    fn overlay(&mut self, desired: &Self);
}

/// Labels and annotations are merged key by key; the owner reference is
/// added when no reference with the same uid exists.
pub fn overlay_meta(live: &mut ObjectMeta, desired: &ObjectMeta) {
    if let Some(labels) = &desired.labels {
        live.labels
            .get_or_insert_with(Default::default)
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(annotations) = desired.annotations.as_ref().filter(|a| !a.is_empty()) {
        live.annotations
            .get_or_insert_with(Default::default)
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    for owner in desired.owner_references.iter().flatten() {
        let owners = live.owner_references.get_or_insert_with(Vec::new);
        if !owners.iter().any(|o| o.uid == owner.uid) {
            owners.push(owner.clone());
        }
    }
}

/// Insert or replace list items matched by `same`
fn upsert_by<T: Clone>(live: &mut Vec<T>, desired: &[T], same: impl Fn(&T, &T) -> bool) {
    for item in desired {
        match live.iter_mut().find(|existing| same(existing, item)) {
            Some(existing) => *existing = item.clone(),
            None => live.push(item.clone()),
        }
    }
}

/// Insert list items matched by `same` that are missing, keep existing ones
fn insert_missing_by<T: Clone>(live: &mut Vec<T>, desired: &[T], same: impl Fn(&T, &T) -> bool) {
    for item in desired {
        if !live.iter().any(|existing| same(existing, item)) {
            live.push(item.clone());
        }
    }
}

fn same_toleration(a: &Toleration, b: &Toleration) -> bool {
    a.key == b.key && a.effect == b.effect
}

fn overlay_container(live: &mut Container, desired: &Container) {
    live.image.clone_from(&desired.image);
    live.image_pull_policy.clone_from(&desired.image_pull_policy);
    live.env.clone_from(&desired.env);
    live.liveness_probe.clone_from(&desired.liveness_probe);
    live.readiness_probe.clone_from(&desired.readiness_probe);
    live.startup_probe.clone_from(&desired.startup_probe);
    live.ports.clone_from(&desired.ports);
    live.security_context.clone_from(&desired.security_context);
    if let Some(mounts) = &desired.volume_mounts {
        insert_missing_by(
            live.volume_mounts.get_or_insert_with(Vec::new),
            mounts,
            |a, b| a.name == b.name,
        );
    }
}

impl Overlay for Pod {
    fn overlay(&mut self, desired: &Self) {
        overlay_meta(&mut self.metadata, &desired.metadata);
        let Some(desired_spec) = &desired.spec else {
            return;
        };
        let Some(live_spec) = self.spec.as_mut() else {
            self.spec = Some(desired_spec.clone());
            return;
        };

        live_spec.host_network = desired_spec.host_network;
        live_spec.affinity.clone_from(&desired_spec.affinity);
        if let Some(tolerations) = &desired_spec.tolerations {
            upsert_by(
                live_spec.tolerations.get_or_insert_with(Vec::new),
                tolerations,
                same_toleration,
            );
        }
        if let Some(volumes) = &desired_spec.volumes {
            insert_missing_by(
                live_spec.volumes.get_or_insert_with(Vec::new),
                volumes,
                |a, b| a.name == b.name,
            );
        }
        for container in &desired_spec.containers {
            match live_spec
                .containers
                .iter_mut()
                .find(|c| c.name == container.name)
            {
                Some(existing) => overlay_container(existing, container),
                None => live_spec.containers.push(container.clone()),
            }
        }
    }
}

impl Overlay for Service {
    fn overlay(&mut self, desired: &Self) {
        overlay_meta(&mut self.metadata, &desired.metadata);
        let Some(desired_spec) = &desired.spec else {
            return;
        };
        let live_spec = self.spec.get_or_insert_with(Default::default);
        live_spec.type_.clone_from(&desired_spec.type_);
        live_spec.ports.clone_from(&desired_spec.ports);
        live_spec.selector.clone_from(&desired_spec.selector);
    }
}

impl Overlay for Ingress {
    fn overlay(&mut self, desired: &Self) {
        overlay_meta(&mut self.metadata, &desired.metadata);
        let Some(desired_spec) = &desired.spec else {
            return;
        };
        let live_spec = self.spec.get_or_insert_with(Default::default);
        live_spec.rules.clone_from(&desired_spec.rules);
        live_spec.tls.clone_from(&desired_spec.tls);
        live_spec
            .ingress_class_name
            .clone_from(&desired_spec.ingress_class_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadDefaults;
    use crate::controller::reconciler::desired::tests::instance;
    use crate::controller::reconciler::desired::{desired_pod, desired_service};
    use k8s_openapi::api::core::v1::{Volume, VolumeMount};
    use std::collections::BTreeMap;

    #[test]
    fn test_overlay_of_identical_object_is_noop() {
        let desired = desired_pod(&instance("home"), &WorkloadDefaults::default());
        let mut live = desired.clone();
        live.overlay(&desired);
        assert_eq!(live, desired);
    }

    #[test]
    fn test_overlay_preserves_server_populated_fields() {
        let desired = desired_pod(&instance("home"), &WorkloadDefaults::default());
        let mut live = desired.clone();
        {
            let spec = live.spec.as_mut().unwrap();
            spec.node_name = Some("node-1".to_string());
            spec.volumes.as_mut().unwrap().push(Volume {
                name: "kube-api-access".to_string(),
                ..Default::default()
            });
            spec.containers[0]
                .volume_mounts
                .as_mut()
                .unwrap()
                .push(VolumeMount {
                    name: "kube-api-access".to_string(),
                    mount_path: "/var/run/secrets/kubernetes.io/serviceaccount".to_string(),
                    ..Default::default()
                });
            spec.containers[0].termination_message_path = Some("/dev/termination-log".to_string());
        }
        live.metadata
            .labels
            .as_mut()
            .unwrap()
            .insert("pod-template-hash".to_string(), "abc".to_string());

        let before = live.clone();
        live.overlay(&desired);
        assert_eq!(live, before);
    }

    #[test]
    fn test_overlay_pushes_changed_image_and_labels() {
        let old = desired_pod(&instance("home"), &WorkloadDefaults::default());
        let mut updated_instance = instance("home");
        updated_instance.spec.version = "2024.6.4".to_string();
        let desired = desired_pod(&updated_instance, &WorkloadDefaults::default());

        let mut live = old.clone();
        live.overlay(&desired);
        assert_eq!(
            live.spec.as_ref().unwrap().containers[0].image.as_deref(),
            Some("homeassistant/home-assistant:2024.6.4")
        );
        assert_eq!(
            live.metadata.labels.as_ref().unwrap()["app.kubernetes.io/version"],
            "2024.6.4"
        );
    }

    #[test]
    fn test_overlay_restores_tampered_identity_label() {
        let desired = desired_service(&instance("home"));
        let mut live = desired.clone();
        live.metadata.labels = Some(BTreeMap::from([(
            "app.kubernetes.io/name".to_string(),
            "custom".to_string(),
        )]));
        live.spec.as_mut().unwrap().cluster_ip = Some("10.0.0.12".to_string());

        live.overlay(&desired);
        assert_eq!(
            live.metadata.labels.as_ref().unwrap()["app.kubernetes.io/name"],
            "home"
        );
        assert_eq!(
            live.spec.as_ref().unwrap().cluster_ip.as_deref(),
            Some("10.0.0.12")
        );
    }

    #[test]
    fn test_overlay_does_not_duplicate_owner_reference() {
        let desired = desired_service(&instance("home"));
        let mut live = desired.clone();
        live.overlay(&desired);
        assert_eq!(live.metadata.owner_references.as_ref().unwrap().len(), 1);
    }
}
