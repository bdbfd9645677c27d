//! # Desired Volume Claim

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use kube::ResourceExt;

use super::labels::{claim_name, dependent_meta};
use super::quantity::{parse_storage_size, QuantityError};
use crate::crd::Instance;

/// ReadWriteOnce claim sized from the Instance's persistence settings
///
/// Fails only when the declared size is not a valid, non-negative quantity.
pub fn desired_claim(instance: &Instance) -> Result<PersistentVolumeClaim, QuantityError> {
    let persistence = &instance.spec.persistence;
    let size = parse_storage_size(persistence.effective_size())?;

    Ok(PersistentVolumeClaim {
        metadata: dependent_meta(instance, claim_name(&instance.name_any())),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), size)])),
                ..Default::default()
            }),
            storage_class_name: persistence.storage_class_name.clone(),
            ..Default::default()
        }),
        status: None,
    })
}
