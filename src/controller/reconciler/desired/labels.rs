//! # Labels and Metadata
//!
//! Naming, identity labels and object metadata shared by every dependent.

use std::collections::BTreeMap;

use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::constants::{
    CLAIM_NAME_SUFFIX, DEFAULT_IMAGE_TAG, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_NAME,
    LABEL_VERSION, MANAGED_BY,
};
use crate::crd::Instance;

/// Name of the volume claim that holds the Instance's `/config`
pub fn claim_name(instance_name: &str) -> String {
    format!("{instance_name}{CLAIM_NAME_SUFFIX}")
}

/// Version used for the image tag and the version label
pub fn effective_version(instance: &Instance) -> &str {
    let version = instance.spec.version.trim();
    if version.is_empty() {
        DEFAULT_IMAGE_TAG
    } else {
        version
    }
}

/// The four labels that identify an Instance's dependents
pub fn identity_labels(instance: &Instance) -> BTreeMap<String, String> {
    let name = instance.name_any();
    BTreeMap::from([
        (LABEL_INSTANCE.to_string(), name.clone()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        (LABEL_NAME.to_string(), name),
        (
            LABEL_VERSION.to_string(),
            effective_version(instance).to_string(),
        ),
    ])
}

/// Labels used by the service to select the pod
pub fn selector_labels(instance: &Instance) -> BTreeMap<String, String> {
    let name = instance.name_any();
    BTreeMap::from([
        (LABEL_INSTANCE.to_string(), name.clone()),
        (LABEL_NAME.to_string(), name),
    ])
}

/// User labels with the identity labels applied last
pub fn dependent_labels(instance: &Instance) -> BTreeMap<String, String> {
    let mut labels = instance.spec.labels.clone();
    labels.extend(identity_labels(instance));
    labels
}

/// Metadata for a dependent named `name`
///
/// Carries the Instance's namespace, the merged labels, the user annotations
/// and a controller owner reference to the Instance.
pub fn dependent_meta(instance: &Instance, name: String) -> ObjectMeta {
    let annotations = &instance.spec.annotations;
    ObjectMeta {
        name: Some(name),
        namespace: instance.namespace(),
        labels: Some(dependent_labels(instance)),
        annotations: (!annotations.is_empty()).then(|| annotations.clone()),
        owner_references: instance.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..Default::default()
    }
}
