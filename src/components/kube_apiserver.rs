//! # kube-apiserver
//!
//! The tenant API server. Rolls out whenever its serving certificate or its
//! configuration changes.

use crate::component::{
    update_container, AdaptError, Component, ComponentOptions, ConfigurationError, ManifestAdapter,
    Workload, WorkloadContext,
};
use crate::components::etcd;

pub const COMPONENT_NAME: &str = "kube-apiserver";

pub const SERVER_CERT_SECRET: &str = "kas-server-crt";
pub const CONFIG_CONFIGMAP: &str = "kas-config";

const DEFAULT_SERVICE_ACCOUNT_ISSUER: &str = "https://kubernetes.default.svc";
const ETCD_CLIENT_PORT: u16 = 2379;

pub fn component() -> Result<Component, ConfigurationError> {
    Component::deployment(COMPONENT_NAME)
        .with_workload(include_str!("../../assets/kube-apiserver/deployment.yaml"))
        .with_manifest("service", include_str!("../../assets/kube-apiserver/service.yaml"))
        .with_manifest(
            "servicemonitor",
            include_str!("../../assets/kube-apiserver/servicemonitor.yaml"),
        )
        .with_manifest_adapter(
            "servicemonitor",
            ManifestAdapter::default()
                .with_namespace_selector()
                .with_cluster_id_label(0),
        )
        .with_adapter(adapt_deployment)
        .with_dependencies([etcd::COMPONENT_NAME])
        .rollout_on_secret_change([SERVER_CERT_SECRET])
        .rollout_on_config_map_change([CONFIG_CONFIGMAP])
        .with_options(ComponentOptions {
            multi_zone_spread: true,
            needs_management_kas_access: false,
            is_request_serving: true,
        })
        .build()
}

fn adapt_deployment(ctx: &WorkloadContext, workload: &mut Workload) -> Result<(), AdaptError> {
    let etcd_servers = format!("https://etcd-client.{}.svc:{ETCD_CLIENT_PORT}", ctx.namespace());
    let issuer = ctx
        .hcp
        .spec
        .issuer_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .unwrap_or(DEFAULT_SERVICE_ACCOUNT_ISSUER)
        .to_string();

    let pod_spec = workload.pod_spec_mut()?;
    update_container(&mut pod_spec.containers, COMPONENT_NAME, |c| {
        let args = c.args.get_or_insert_with(Vec::new);
        set_arg(args, "--etcd-servers", &etcd_servers);
        set_arg(args, "--service-account-issuer", &issuer);
    })
}

/// Replace `flag=...` in place, or append it
fn set_arg(args: &mut Vec<String>, flag: &str, value: &str) {
    let prefix = format!("{flag}=");
    let arg = format!("{prefix}{value}");
    match args.iter_mut().find(|a| a.starts_with(&prefix)) {
        Some(existing) => *existing = arg,
        None => args.push(arg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_arg_replaces_existing_flag() {
        let mut args = vec!["--etcd-servers=https://old:2379".to_string(), "--v=2".to_string()];
        set_arg(&mut args, "--etcd-servers", "https://new:2379");
        set_arg(&mut args, "--service-account-issuer", "https://issuer");
        assert_eq!(
            args,
            vec![
                "--etcd-servers=https://new:2379",
                "--v=2",
                "--service-account-issuer=https://issuer"
            ]
        );
    }

    #[test]
    fn test_component_registration() {
        let kas = component().expect("valid component");
        assert_eq!(kas.dependencies(), ["etcd".to_string()]);
        assert_eq!(kas.rollout_secrets(), [SERVER_CERT_SECRET.to_string()]);
        assert_eq!(kas.rollout_config_maps(), [CONFIG_CONFIGMAP.to_string()]);
        assert!(kas.options().is_request_serving);
    }
}
