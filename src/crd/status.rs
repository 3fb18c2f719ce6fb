//! # HostedControlPlane Status
//!
//! Status types for tracking reconciliation state and per-component conditions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the HostedControlPlane resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostedControlPlaneStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// One record per registered component, in reconciliation order
    #[serde(default)]
    pub components: Vec<ComponentStatus>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last reconciliation time (RFC3339)
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
}

impl HostedControlPlaneStatus {
    /// Status record of a component, if one was recorded
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&ComponentStatus> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Where a component ended up in the most recent reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ComponentPhase {
    /// Not yet evaluated in this pass
    #[default]
    Pending,
    /// Predicate returned false; objects were left untouched
    PredicateSkipped,
    /// A dependency is not ready; objects were left untouched
    BlockedOnDependency,
    /// Adapters are running
    Adapting,
    /// Objects are being written to the object store
    Applying,
    /// Objects applied and the workload is healthy
    Available,
    /// Objects applied and the workload controller is still rolling out
    Progressing,
    /// Adapting or applying failed
    Degraded,
}

impl ComponentPhase {
    /// Get string representation for logs and metric labels
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentPhase::Pending => "Pending",
            ComponentPhase::PredicateSkipped => "PredicateSkipped",
            ComponentPhase::BlockedOnDependency => "BlockedOnDependency",
            ComponentPhase::Adapting => "Adapting",
            ComponentPhase::Applying => "Applying",
            ComponentPhase::Available => "Available",
            ComponentPhase::Progressing => "Progressing",
            ComponentPhase::Degraded => "Degraded",
        }
    }

    /// Condition reported for this phase
    #[must_use]
    pub fn condition(&self) -> ComponentCondition {
        match self {
            ComponentPhase::Available => ComponentCondition::Available,
            ComponentPhase::Progressing => ComponentCondition::Progressing,
            ComponentPhase::Degraded => ComponentCondition::Degraded,
            _ => ComponentCondition::Unknown,
        }
    }
}

impl fmt::Display for ComponentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health condition of a component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ComponentCondition {
    Available,
    Progressing,
    Degraded,
    #[default]
    Unknown,
}

/// Per-component, per-tenant status record
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Component name
    pub name: String,
    /// Outcome of the most recent pass
    #[serde(default)]
    pub phase: ComponentPhase,
    /// Health condition derived from the phase
    #[serde(default)]
    pub condition: ComponentCondition,
    /// HostedControlPlane generation the record was computed for
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Rollout fingerprint last written to the workload
    #[serde(default)]
    pub last_applied_fingerprint: Option<String>,
    /// Human-readable detail (error, unmet dependencies, skip reason)
    #[serde(default)]
    pub message: Option<String>,
    /// When the phase last changed (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

impl ComponentStatus {
    /// Create a fresh record for a component
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether dependents of this component may proceed
    #[must_use]
    pub fn satisfies_dependents(&self, allow_progressing: bool) -> bool {
        match self.phase {
            ComponentPhase::Available => true,
            ComponentPhase::Progressing => allow_progressing,
            _ => false,
        }
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
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
