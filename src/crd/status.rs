//! # Instance Status
//!
//! Status types for reporting the outcome of the last reconciliation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// High-level summary of an Instance's dependents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum InstancePhase {
    /// Accepted, but one or more dependents are not in place yet
    Pending,
    /// Every dependent has been created and is current
    Created,
    /// At least one dependent could not be created or updated
    Failed,
}

impl fmt::Display for InstancePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Created => "Created",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Status of the Instance resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    /// Current phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<InstancePhase>,
    /// Human-readable details about the phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Brief CamelCase reason for the phase
    /// Values: Reconciled, InvalidSpec, DependentFailed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Generation of the spec the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Last reconciliation time (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl InstanceStatus {
    /// Whether `other` reports the same outcome, ignoring timestamps
    pub fn same_outcome(&self, other: &InstanceStatus) -> bool {
        self.phase == other.phase
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
