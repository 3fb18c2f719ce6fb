//! # etcd
//!
//! Clustered etcd as a StatefulSet behind a headless discovery service. The
//! static `--initial-cluster` membership list follows the replica count.

use crate::component::{update_container, AdaptError, Component, ConfigurationError, Workload, WorkloadContext};

pub const COMPONENT_NAME: &str = "etcd";

const DISCOVERY_SERVICE: &str = "etcd-discovery";
const PEER_PORT: u16 = 2380;
const INITIAL_CLUSTER_ARG: &str = "--initial-cluster";

pub fn component() -> Result<Component, ConfigurationError> {
    Component::statefulset(COMPONENT_NAME)
        .with_workload(include_str!("../../assets/etcd/statefulset.yaml"))
        .with_manifest("service-client", include_str!("../../assets/etcd/service-client.yaml"))
        .with_manifest(
            "service-discovery",
            include_str!("../../assets/etcd/service-discovery.yaml"),
        )
        .with_adapter(adapt_statefulset)
        .build()
}

fn adapt_statefulset(ctx: &WorkloadContext, workload: &mut Workload) -> Result<(), AdaptError> {
    let replicas = workload.replicas().unwrap_or(1);
    let initial_cluster = initial_cluster(ctx.namespace(), replicas);
    let pod_spec = workload.pod_spec_mut()?;
    update_container(&mut pod_spec.containers, COMPONENT_NAME, |c| {
        let args = c.args.get_or_insert_with(Vec::new);
        let prefix = format!("{INITIAL_CLUSTER_ARG}=");
        args.retain(|a| !a.starts_with(&prefix));
        args.push(format!("{INITIAL_CLUSTER_ARG}={initial_cluster}"));
    })
}

/// `etcd-0=https://etcd-0.etcd-discovery.<ns>.svc:2380,...`
fn initial_cluster(namespace: &str, replicas: i32) -> String {
    (0..replicas.max(1))
        .map(|i| {
            format!("{COMPONENT_NAME}-{i}=https://{COMPONENT_NAME}-{i}.{DISCOVERY_SERVICE}.{namespace}.svc:{PEER_PORT}")
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::WorkloadKind;

    #[test]
    fn test_initial_cluster_lists_every_member() {
        assert_eq!(
            initial_cluster("clusters-a", 3),
            "etcd-0=https://etcd-0.etcd-discovery.clusters-a.svc:2380,\
             etcd-1=https://etcd-1.etcd-discovery.clusters-a.svc:2380,\
             etcd-2=https://etcd-2.etcd-discovery.clusters-a.svc:2380"
        );
        assert_eq!(
            initial_cluster("clusters-a", 1),
            "etcd-0=https://etcd-0.etcd-discovery.clusters-a.svc:2380"
        );
    }

    #[test]
    fn test_initial_cluster_state_is_kept() {
        let mut workload =
            Workload::from_yaml(WorkloadKind::StatefulSet, include_str!("../../assets/etcd/statefulset.yaml"))
                .expect("valid template");
        let hcp: crate::crd::HostedControlPlane = serde_json::from_value(serde_json::json!({
            "apiVersion": "hypershift.openshift.io/v1beta1",
            "kind": "HostedControlPlane",
            "metadata": {"name": "a", "namespace": "clusters-a"},
            "spec": {"platform": {"type": "None"}, "clusterID": "x", "infraID": "a", "releaseImage": "r:4.17"}
        }))
        .expect("valid HostedControlPlane");
        let ctx = WorkloadContext::new(
            std::sync::Arc::new(hcp),
            std::sync::Arc::new(crate::component::ReleaseImages::default()),
            std::sync::Arc::new(crate::controller::store::MemoryObjectStore::new()),
        );

        adapt_statefulset(&ctx, &mut workload).expect("adapts");
        adapt_statefulset(&ctx, &mut workload).expect("adapts twice");

        let args = workload.pod_spec_mut().expect("pod spec").containers[0]
            .args
            .clone()
            .unwrap_or_default();
        assert!(args.contains(&"--initial-cluster-state=new".to_string()));
        assert_eq!(args.iter().filter(|a| a.starts_with("--initial-cluster=")).count(), 1);
    }

    #[test]
    fn test_component_builds() {
        let etcd = component().expect("valid component");
        assert_eq!(etcd.manifests().len(), 2);
        assert!(etcd.dependencies().is_empty());
    }
}
