//! # Cluster Autoscaling
//!
//! Typed cluster autoscaler configuration carried on the `HostedControlPlane`.

use serde::{Deserialize, Serialize};

/// Cluster autoscaler options
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAutoscaling {
    /// Whether the autoscaler may remove nodes
    #[serde(default)]
    pub scaling: ScalingType,
    /// Scale-down tuning, only honored with `ScaleUpAndScaleDown`
    #[serde(default)]
    pub scale_down: Option<ScaleDownConfig>,
    /// Upper bound on the number of nodes in the cluster
    #[serde(default)]
    pub max_nodes_total: Option<i32>,
    /// Seconds a pod is given to terminate gracefully during scale down
    #[serde(default)]
    pub max_pod_grace_period: Option<i32>,
    /// How long to wait for a node to be provisioned (e.g. "15m")
    #[serde(default)]
    pub max_node_provision_time: Option<String>,
    /// Maximum free resource difference between similar node groups (0-100)
    #[serde(default)]
    pub max_free_difference_ratio_percent: Option<i32>,
    /// Pods below this priority do not trigger scale up
    #[serde(default)]
    pub pod_priority_threshold: Option<i32>,
    /// Extra node labels ignored when balancing similar node groups
    #[serde(default)]
    pub balancing_ignored_labels: Vec<String>,
    /// Expander strategies, applied in order
    #[serde(default)]
    pub expanders: Vec<ExpanderString>,
}

/// Scaling behavior of the autoscaler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ScalingType {
    ScaleUpOnly,
    #[default]
    ScaleUpAndScaleDown,
}

/// Scale-down tuning
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScaleDownConfig {
    #[serde(default)]
    pub delay_after_add_seconds: Option<i32>,
    #[serde(default)]
    pub delay_after_delete_seconds: Option<i32>,
    #[serde(default)]
    pub delay_after_failure_seconds: Option<i32>,
    #[serde(default)]
    pub unneeded_duration_seconds: Option<i32>,
    /// Node utilization (0-100) below which a node may be removed
    #[serde(default)]
    pub utilization_threshold_percent: Option<i32>,
}

/// Autoscaler expander strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ExpanderString {
    LeastWaste,
    Priority,
    Random,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_defaults_to_scale_up_and_down() {
        let autoscaling: ClusterAutoscaling =
            serde_json::from_str("{}").expect("empty autoscaling is valid");
        assert_eq!(autoscaling.scaling, ScalingType::ScaleUpAndScaleDown);
        assert!(autoscaling.expanders.is_empty());
    }

    #[test]
    fn test_scale_down_camel_case_fields() {
        let autoscaling: ClusterAutoscaling = serde_json::from_str(
            r#"{"scaling":"ScaleUpAndScaleDown","scaleDown":{"delayAfterAddSeconds":60,"utilizationThresholdPercent":75},"expanders":["Priority","LeastWaste"]}"#,
        )
        .expect("valid autoscaling");
        let scale_down = autoscaling.scale_down.expect("scale down present");
        assert_eq!(scale_down.delay_after_add_seconds, Some(60));
        assert_eq!(scale_down.utilization_threshold_percent, Some(75));
        assert_eq!(
            autoscaling.expanders,
            vec![ExpanderString::Priority, ExpanderString::LeastWaste]
        );
    }
}
