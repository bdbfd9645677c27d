//! # Desired Pod
//!
//! The single-container pod that runs Home Assistant.

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HostPathVolumeSource, PersistentVolumeClaimVolumeSource, Pod,
    PodSpec, Probe, SecurityContext, TCPSocketAction, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::labels::{claim_name, dependent_meta, effective_version};
use crate::config::WorkloadDefaults;
use crate::constants::{
    APP_PORT, APP_PORT_NAME, CONFIG_MOUNT_PATH, CONFIG_VOLUME, DBUS_HOST_PATH, DBUS_VOLUME,
    NODE_TOLERATION_SECONDS,
};
use crate::crd::Instance;

const NOT_READY_TAINT: &str = "node.kubernetes.io/not-ready";
const UNREACHABLE_TAINT: &str = "node.kubernetes.io/unreachable";

/// Build the desired pod for an Instance
pub fn desired_pod(instance: &Instance, defaults: &WorkloadDefaults) -> Pod {
    let name = instance.name_any();
    Pod {
        metadata: dependent_meta(instance, name.clone()),
        spec: Some(PodSpec {
            // Unset and `false` are the same to the API server; omit it so the
            // live object compares equal.
            host_network: instance.spec.host_network.then_some(true),
            affinity: instance.spec.affinity.clone(),
            tolerations: Some(vec![
                node_toleration(NOT_READY_TAINT),
                node_toleration(UNREACHABLE_TAINT),
            ]),
            volumes: Some(vec![
                Volume {
                    name: CONFIG_VOLUME.to_string(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: claim_name(&name),
                        read_only: None,
                    }),
                    ..Default::default()
                },
                Volume {
                    name: DBUS_VOLUME.to_string(),
                    host_path: Some(HostPathVolumeSource {
                        path: DBUS_HOST_PATH.to_string(),
                        type_: None,
                    }),
                    ..Default::default()
                },
            ]),
            containers: vec![container(instance, &name, defaults)],
            ..Default::default()
        }),
        status: None,
    }
}

fn container(instance: &Instance, name: &str, defaults: &WorkloadDefaults) -> Container {
    let env = &instance.spec.env;
    Container {
        name: name.to_string(),
        image: Some(format!(
            "{}:{}",
            defaults.image_repository,
            effective_version(instance)
        )),
        image_pull_policy: Some(defaults.image_pull_policy.clone()),
        env: (!env.is_empty()).then(|| env.clone()),
        liveness_probe: Some(tcp_probe(10, 3)),
        readiness_probe: Some(tcp_probe(10, 3)),
        startup_probe: Some(tcp_probe(5, 30)),
        ports: Some(vec![ContainerPort {
            name: Some(APP_PORT_NAME.to_string()),
            container_port: APP_PORT,
            host_port: Some(APP_PORT),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        volume_mounts: Some(vec![
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: DBUS_VOLUME.to_string(),
                mount_path: DBUS_HOST_PATH.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

fn tcp_probe(period_seconds: i32, failure_threshold: i32) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            host: None,
            port: IntOrString::Int(APP_PORT),
        }),
        period_seconds: Some(period_seconds),
        failure_threshold: Some(failure_threshold),
        success_threshold: Some(1),
        timeout_seconds: Some(1),
        ..Default::default()
    }
}

fn node_toleration(key: &str) -> Toleration {
    Toleration {
        key: Some(key.to_string()),
        operator: Some("Exists".to_string()),
        effect: Some("NoExecute".to_string()),
        toleration_seconds: Some(NODE_TOLERATION_SECONDS),
        value: None,
    }
}
