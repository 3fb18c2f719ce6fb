//! # karpenter-operator
//!
//! Manages Karpenter for tenants that opted into automatic node provisioning.
//! Only reconciled on AWS with `spec.autoNode` set.

use crate::component::{Component, ConfigurationError, KonnectivityMode, KonnectivityOptions, ManifestAdapter};
use crate::components::{kube_apiserver, tenant_role_binding};
use crate::crd::PlatformType;

pub const COMPONENT_NAME: &str = "karpenter-operator";

pub fn component() -> Result<Component, ConfigurationError> {
    Component::deployment(COMPONENT_NAME)
        .with_workload(include_str!("../../assets/karpenter-operator/deployment.yaml"))
        .with_manifest(
            "podmonitor",
            include_str!("../../assets/karpenter-operator/podmonitor.yaml"),
        )
        .with_manifest(
            "serviceaccount",
            include_str!("../../assets/karpenter-operator/serviceaccount.yaml"),
        )
        .with_manifest("role", include_str!("../../assets/karpenter-operator/role.yaml"))
        .with_manifest(
            "rolebinding",
            include_str!("../../assets/karpenter-operator/rolebinding.yaml"),
        )
        .with_manifest_adapter(
            "podmonitor",
            ManifestAdapter::default()
                .with_namespace_selector()
                .with_cluster_id_label(0),
        )
        .with_manifest_adapter("rolebinding", tenant_role_binding())
        .with_predicate(|ctx| {
            let spec = &ctx.hcp.spec;
            Ok(spec.platform.platform_type == PlatformType::Aws && spec.auto_node.is_some())
        })
        .with_dependencies([kube_apiserver::COMPONENT_NAME])
        .inject_konnectivity_container(KonnectivityOptions {
            mode: KonnectivityMode::Socks5,
            connect_directly_to_cloud_apis: true,
            ..KonnectivityOptions::default()
        })
        .build()
}
