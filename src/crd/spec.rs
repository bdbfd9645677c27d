//! # Instance Spec
//!
//! Main CRD specification for a single Home Assistant installation.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Affinity, EnvVar};
use schemars::{json_schema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// Instance Custom Resource Definition
///
/// One Instance yields one volume claim, one pod, one service and, when
/// enabled, one ingress, all named after the Instance.
///
/// # Example
///
/// ```yaml
/// apiVersion: home-assistant.lmatfy.io/v1alpha1
/// kind: Instance
/// metadata:
///   name: home
///   namespace: smart-home
/// spec:
///   version: "2024.6.4"
///   hostNetwork: true
///   env:
///     - name: TZ
///       value: Europe/Berlin
///   ingress:
///     enabled: true
///     host: home.example.com
///     secretName: home-example-com-tls
///   persistence:
///     size: 5Gi
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "Instance",
    group = "home-assistant.lmatfy.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::InstanceStatus",
    shortname = "hai",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}, {"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Reason", "type":"string", "jsonPath":".status.reason"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Additional labels added to every dependent resource
    /// The operator's identity labels always win on conflict
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Additional annotations added to every dependent resource
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Home Assistant version, used as the container image tag
    /// Empty selects the `stable` tag.
    /// The `app.kubernetes.io/version` label of every dependent carries the same effective tag.
    #[serde(default)]
    pub version: String,
    /// Environment variables for the Home Assistant container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "env_schema")]
    pub env: Vec<EnvVar>,
    /// Use the host's network namespace
    /// Default: false
    #[serde(default)]
    pub host_network: bool,
    /// Pod scheduling constraints, copied verbatim to the pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "affinity_schema")]
    pub affinity: Option<Affinity>,
    /// Ingress settings
    #[serde(default)]
    pub ingress: IngressConfig,
    /// Volume claim settings
    #[serde(default)]
    pub persistence: Persistence,
}

/// Ingress settings for an Instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    /// Whether an Ingress resource exists for this Instance
    /// Default: false
    #[serde(default)]
    pub enabled: bool,
    /// Host routed to the Instance and covered by the TLS entry
    #[serde(default)]
    pub host: String,
    /// Secret holding the TLS certificate for `host`
    #[serde(default)]
    pub secret_name: String,
    /// IngressClass to bind the Ingress to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
}

/// Volume claim settings for an Instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Persistence {
    /// Requested storage as a Kubernetes quantity (e.g., "1Gi", "500Mi")
    /// Default: "1Gi" when empty
    /// The claim is never resized after creation
    #[serde(default)]
    pub size: String,
    /// StorageClass required by the claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

impl Persistence {
    /// Size with the default applied
    pub fn effective_size(&self) -> &str {
        if self.size.trim().is_empty() {
            crate::constants::DEFAULT_STORAGE_SIZE
        } else {
            self.size.trim()
        }
    }
}

fn env_schema(_gen: &mut SchemaGenerator) -> Schema {
    // EnvVar is validated by the API server when the pod is written
    json_schema!({
        "type": "array",
        "description": "List of environment variables to set in the Home Assistant container.",
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}

fn affinity_schema(_gen: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "nullable": true,
        "description": "If specified, the pod's scheduling constraints.",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
