//! # HostedControlPlane Spec
//!
//! The tenant cluster's control plane description. One `HostedControlPlane`
//! lives in each tenant namespace of the management cluster; every control
//! plane component for that tenant is reconciled from it.

use serde::{Deserialize, Serialize};

use crate::crd::ClusterAutoscaling;

/// HostedControlPlane Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: hypershift.openshift.io/v1beta1
/// kind: HostedControlPlane
/// metadata:
///   name: example
///   namespace: clusters-example
/// spec:
///   platform:
///     type: AWS
///   clusterID: 5b1e7a57-7d0e-4a3c-9a0e-2b4f3c1d9e10
///   infraID: example-x7k2p
///   releaseImage: quay.io/openshift-release-dev/ocp-release:4.17.0-x86_64
///   controllerAvailabilityPolicy: HighlyAvailable
///   autoscaling:
///     maxNodesTotal: 20
///     scaleDown:
///       delayAfterAddSeconds: 600
///       utilizationThresholdPercent: 50
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "HostedControlPlane",
    group = "hypershift.openshift.io",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::HostedControlPlaneStatus",
    shortname = "hcp",
    printcolumn = r#"{"name":"Platform", "type":"string", "jsonPath":".spec.platform.type"}, {"name":"Available", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ComponentsAvailable\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HostedControlPlaneSpec {
    /// Infrastructure platform the tenant cluster runs on
    pub platform: PlatformSpec,
    /// Unique identifier of the tenant cluster, used to label telemetry
    #[serde(rename = "clusterID")]
    pub cluster_id: String,
    /// Infrastructure identifier used to name cloud and in-cluster resources
    #[serde(rename = "infraID")]
    pub infra_id: String,
    /// Release payload the control plane is built from
    pub release_image: String,
    /// Replica policy for control plane workloads
    #[serde(default)]
    pub controller_availability_policy: AvailabilityPolicy,
    /// Service account token issuer URL
    #[serde(default, rename = "issuerURL")]
    pub issuer_url: Option<String>,
    /// Cluster autoscaler configuration
    #[serde(default)]
    pub autoscaling: ClusterAutoscaling,
    /// Karpenter based node provisioning (AWS only)
    #[serde(default)]
    pub auto_node: Option<AutoNode>,
}

/// Platform section of the spec
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSpec {
    /// Platform type
    #[serde(rename = "type")]
    pub platform_type: PlatformType,
}

/// Supported infrastructure platforms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum PlatformType {
    #[serde(rename = "AWS")]
    Aws,
    Azure,
    #[serde(rename = "IBMCloud")]
    IbmCloud,
    KubeVirt,
    Agent,
    PowerVS,
    OpenStack,
    #[default]
    None,
}

/// Replica policy for control plane workloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum AvailabilityPolicy {
    #[default]
    SingleReplica,
    HighlyAvailable,
}

impl AvailabilityPolicy {
    /// Replica count for a control plane workload under this policy
    #[must_use]
    pub fn replicas(self) -> i32 {
        match self {
            AvailabilityPolicy::SingleReplica => 1,
            AvailabilityPolicy::HighlyAvailable => 3,
        }
    }
}

/// Karpenter provisioner settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoNode {
    /// IAM role ARN the karpenter controller assumes
    #[serde(default)]
    pub role_arn: Option<String>,
}

impl HostedControlPlane {
    /// Namespace of the tenant control plane
    #[must_use]
    pub fn tenant_namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or("default")
    }

    /// Whether the given annotation key is present on the resource
    #[must_use]
    pub fn has_annotation(&self, key: &str) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(key))
    }

    /// Value of the given annotation, if present
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }
}
