//! # cluster-autoscaler
//!
//! Cluster API based autoscaler for the tenant's node pools. Its arguments are
//! derived from `spec.autoscaling`; the order of generated flags is stable so
//! identical specs render byte-identical workloads.

use crate::component::{
    update_container, update_volume, AdaptError, AvailabilityProberOptions, Component,
    ConfigurationError, RequiredApi, Workload, WorkloadContext,
};
use crate::components::{kube_apiserver, tenant_role_binding};
use crate::constants::{CLUSTER_AUTOSCALER_IMAGE_ANNOTATION, DISABLE_CLUSTER_AUTOSCALER_ANNOTATION};
use crate::crd::{ClusterAutoscaling, ExpanderString, PlatformType, ScaleDownConfig, ScalingType};

pub const COMPONENT_NAME: &str = "cluster-autoscaler";

const KUBECONFIG_VOLUME: &str = "kubeconfig";

const BALANCING_IGNORE_LABEL_ARG: &str = "--balancing-ignore-label";
const EXPANDER_ARG: &str = "--expander";
const EXPENDABLE_PODS_PRIORITY_CUTOFF_ARG: &str = "--expendable-pods-priority-cutoff";
const MAX_NODES_TOTAL_ARG: &str = "--max-nodes-total";
const MAX_GRACEFUL_TERMINATION_SEC_ARG: &str = "--max-graceful-termination-sec";
const MAX_NODE_PROVISION_TIME_ARG: &str = "--max-node-provision-time";
const MAX_FREE_DIFFERENCE_RATIO_ARG: &str = "--max-free-difference-ratio";
const SCALE_DOWN_ENABLED_ARG: &str = "--scale-down-enabled";
const SCALE_DOWN_DELAY_AFTER_ADD_ARG: &str = "--scale-down-delay-after-add";
const SCALE_DOWN_DELAY_AFTER_DELETE_ARG: &str = "--scale-down-delay-after-delete";
const SCALE_DOWN_DELAY_AFTER_FAILURE_ARG: &str = "--scale-down-delay-after-failure";
const SCALE_DOWN_UNNEEDED_TIME_ARG: &str = "--scale-down-unneeded-time";
const SCALE_DOWN_UTILIZATION_THRESHOLD_ARG: &str = "--scale-down-utilization-threshold";

const DEFAULT_EXPANDERS: &str = "priority,least-waste";

/// Node labels the autoscaler ignores when comparing node groups
///
/// `balance-similar-node-groups` is always on, so labels that differ between
/// otherwise identical groups (zone IDs, pool names) must be ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreLabelTables {
    pub common: Vec<String>,
    pub aws: Vec<String>,
    pub azure: Vec<String>,
}

impl IgnoreLabelTables {
    #[must_use]
    pub fn defaults() -> Self {
        let owned = |labels: &[&str]| labels.iter().map(ToString::to_string).collect();
        Self {
            common: owned(&[
                "hypershift.openshift.io/nodePool",
                "topology.ebs.csi.aws.com/zone",
                "topology.disk.csi.azure.com/zone",
                "ibm-cloud.kubernetes.io/worker-id",
                "vpc-block-csi-driver-labels",
            ]),
            aws: owned(&[
                "lifecycle",
                "k8s.amazonaws.com/eniConfig",
                "topology.k8s.aws/zone-id",
            ]),
            azure: owned(&["agentpool", "kubernetes.azure.com/agentpool"]),
        }
    }

    /// Common labels followed by the platform's own
    pub fn for_platform(&self, platform: PlatformType) -> impl Iterator<Item = &str> {
        let specific: &[String] = match platform {
            PlatformType::Aws => &self.aws,
            PlatformType::Azure => &self.azure,
            _ => &[],
        };
        self.common.iter().chain(specific).map(String::as_str)
    }
}

impl Default for IgnoreLabelTables {
    fn default() -> Self {
        Self::defaults()
    }
}

pub fn component(labels: IgnoreLabelTables) -> Result<Component, ConfigurationError> {
    Component::deployment(COMPONENT_NAME)
        .with_workload(include_str!("../../assets/cluster-autoscaler/deployment.yaml"))
        .with_manifest(
            "serviceaccount",
            include_str!("../../assets/cluster-autoscaler/serviceaccount.yaml"),
        )
        .with_manifest("role", include_str!("../../assets/cluster-autoscaler/role.yaml"))
        .with_manifest(
            "rolebinding",
            include_str!("../../assets/cluster-autoscaler/rolebinding.yaml"),
        )
        .with_manifest_adapter("rolebinding", tenant_role_binding())
        .with_predicate(|ctx| Ok(ctx.hcp.spec.platform.platform_type != PlatformType::None))
        .with_adapter(move |ctx, workload| adapt_deployment(ctx, workload, &labels))
        .with_dependencies([kube_apiserver::COMPONENT_NAME])
        .inject_availability_prober(AvailabilityProberOptions {
            kubeconfig_volume_name: Some(KUBECONFIG_VOLUME.to_string()),
            required_apis: vec![
                RequiredApi::new("cluster.x-k8s.io", "v1beta1", "MachineDeployment"),
                RequiredApi::new("cluster.x-k8s.io", "v1beta1", "MachineSet"),
                RequiredApi::new("cluster.x-k8s.io", "v1beta1", "Machine"),
            ],
            ..AvailabilityProberOptions::default()
        })
        .build()
}

fn adapt_deployment(
    ctx: &WorkloadContext,
    workload: &mut Workload,
    labels: &IgnoreLabelTables,
) -> Result<(), AdaptError> {
    let hcp = &ctx.hcp;
    let image_override = hcp.annotation(CLUSTER_AUTOSCALER_IMAGE_ANNOTATION).map(str::to_string);
    let args = autoscaler_args(&hcp.spec.autoscaling, hcp.spec.platform.platform_type, labels);
    let kubeconfig_secret = format!("{}-kubeconfig", hcp.spec.infra_id);

    let pod_spec = workload.pod_spec_mut()?;
    update_container(&mut pod_spec.containers, COMPONENT_NAME, |c| {
        if let Some(image) = image_override {
            c.image = Some(image);
        }
        c.args.get_or_insert_with(Vec::new).extend(args);
    })?;
    update_volume(
        pod_spec.volumes.get_or_insert_with(Vec::new),
        KUBECONFIG_VOLUME,
        |v| {
            if let Some(secret) = v.secret.as_mut() {
                secret.secret_name = Some(kubeconfig_secret);
            }
        },
    )?;

    let replicas = if hcp.has_annotation(DISABLE_CLUSTER_AUTOSCALER_ANNOTATION) {
        0
    } else {
        1
    };
    workload.set_replicas(replicas)
}

/// Autoscaler flags for the given configuration
#[must_use]
pub fn autoscaler_args(
    options: &ClusterAutoscaling,
    platform: PlatformType,
    labels: &IgnoreLabelTables,
) -> Vec<String> {
    let mut args = Vec::new();

    match options.scaling {
        ScalingType::ScaleUpOnly => args.push(arg(SCALE_DOWN_ENABLED_ARG, false)),
        ScalingType::ScaleUpAndScaleDown => {
            if let Some(scale_down) = &options.scale_down {
                args.extend(scale_down_args(scale_down));
            }
        }
    }

    if let Some(max) = options.max_nodes_total {
        args.push(arg(MAX_NODES_TOTAL_ARG, max));
    }
    if let Some(grace) = options.max_pod_grace_period {
        args.push(arg(MAX_GRACEFUL_TERMINATION_SEC_ARG, grace));
    }
    if let Some(time) = options.max_node_provision_time.as_deref().filter(|t| !t.is_empty()) {
        args.push(arg(MAX_NODE_PROVISION_TIME_ARG, time));
    }
    if let Some(percent) = options.max_free_difference_ratio_percent {
        args.push(arg(MAX_FREE_DIFFERENCE_RATIO_ARG, ratio(percent)));
    }
    if let Some(threshold) = options.pod_priority_threshold {
        args.push(arg(EXPENDABLE_PODS_PRIORITY_CUTOFF_ARG, threshold));
    }
    for label in &options.balancing_ignored_labels {
        args.push(arg(BALANCING_IGNORE_LABEL_ARG, label));
    }

    let expanders = if options.expanders.is_empty() {
        DEFAULT_EXPANDERS.to_string()
    } else {
        options
            .expanders
            .iter()
            .map(|e| expander_flag(*e))
            .collect::<Vec<_>>()
            .join(",")
    };
    args.push(arg(EXPANDER_ARG, expanders));

    args.extend(
        labels
            .for_platform(platform)
            .map(|label| arg(BALANCING_IGNORE_LABEL_ARG, label)),
    );
    args
}

/// Flags enabling and tuning scale down
#[must_use]
pub fn scale_down_args(scale_down: &ScaleDownConfig) -> Vec<String> {
    let mut args = vec![arg(SCALE_DOWN_ENABLED_ARG, true)];
    let durations = [
        (SCALE_DOWN_DELAY_AFTER_ADD_ARG, scale_down.delay_after_add_seconds),
        (SCALE_DOWN_DELAY_AFTER_DELETE_ARG, scale_down.delay_after_delete_seconds),
        (SCALE_DOWN_DELAY_AFTER_FAILURE_ARG, scale_down.delay_after_failure_seconds),
        (SCALE_DOWN_UNNEEDED_TIME_ARG, scale_down.unneeded_duration_seconds),
    ];
    for (flag, seconds) in durations {
        if let Some(seconds) = seconds {
            args.push(arg(flag, format!("{seconds}s")));
        }
    }
    if let Some(percent) = scale_down.utilization_threshold_percent {
        args.push(arg(SCALE_DOWN_UTILIZATION_THRESHOLD_ARG, ratio(percent)));
    }
    args
}

fn arg(flag: &str, value: impl std::fmt::Display) -> String {
    format!("{flag}={value}")
}

/// Percent as a two-decimal fraction: 75 -> "0.75"
fn ratio(percent: i32) -> String {
    format!("{:.2}", f64::from(percent) / 100.0)
}

fn expander_flag(expander: ExpanderString) -> &'static str {
    match expander {
        ExpanderString::LeastWaste => "least-waste",
        ExpanderString::Priority => "priority",
        ExpanderString::Random => "random",
    }
}
