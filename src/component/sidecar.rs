//! # Sidecar Injection
//!
//! Containers added to a workload after its primary adapter has run:
//!
//! - **Availability prober**: an init container that blocks pod start until the
//!   tenant API server is reachable (and optionally serves required APIs).
//! - **Konnectivity proxy**: a sidecar tunnelling traffic from the management
//!   cluster into the tenant network, in SOCKS5 or HTTPS mode.
//!
//! Both injections are idempotent: containers and volumes are replaced by name.

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, PodSpec, SecretVolumeSource, Volume, VolumeMount,
};

use crate::component::{upsert_container, upsert_volume, AdaptError, WorkloadContext};

pub const AVAILABILITY_PROBER_CONTAINER: &str = "availability-prober";
const AVAILABILITY_PROBER_IMAGE: &str = "availability-prober";
const AVAILABILITY_PROBER_TARGET: &str = "https://kube-apiserver:6443/readyz";
const PROBER_KUBECONFIG_DIR: &str = "/var/kubeconfig";

const KONNECTIVITY_IMAGE: &str = "apiserver-network-proxy";
const KONNECTIVITY_CERT_VOLUME: &str = "konnectivity-proxy-cert";
const KONNECTIVITY_CA_VOLUME: &str = "konnectivity-proxy-ca";
const KONNECTIVITY_CLIENT_SECRET: &str = "konnectivity-client";
const KONNECTIVITY_CA_CONFIGMAP: &str = "konnectivity-ca-bundle";
const KONNECTIVITY_SERVER_HOST: &str = "konnectivity-server-local";
const KONNECTIVITY_SERVER_PORT: u16 = 8090;
const PROXY_KUBECONFIG_DIR: &str = "/etc/kubernetes";

const CONTROL_PLANE_OPERATOR_BINARY: &str = "/usr/bin/control-plane-operator";

/// API the prober waits for before letting the pod start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredApi {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl RequiredApi {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }
}

/// Availability prober options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityProberOptions {
    /// Volume holding a kubeconfig for the tenant API server
    pub kubeconfig_volume_name: Option<String>,
    pub required_apis: Vec<RequiredApi>,
    pub wait_for_infrastructure_resource: bool,
    /// `<namespace>/<label selector>` of pods that must be gone
    pub wait_for_labeled_pods_gone: Option<String>,
    pub wait_for_cluster_role_binding: Option<String>,
}

/// Proxy protocol served by the konnectivity sidecar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KonnectivityMode {
    #[default]
    Socks5,
    Https,
}

impl KonnectivityMode {
    fn container_name(self) -> &'static str {
        match self {
            KonnectivityMode::Socks5 => "konnectivity-proxy-socks5",
            KonnectivityMode::Https => "konnectivity-proxy-https",
        }
    }

    fn subcommand(self) -> &'static str {
        match self {
            KonnectivityMode::Socks5 => "konnectivity-socks5-proxy",
            KonnectivityMode::Https => "konnectivity-https-proxy",
        }
    }
}

/// Konnectivity sidecar options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KonnectivityOptions {
    pub mode: KonnectivityMode,
    /// Resolve hostnames through the tenant cluster DNS (SOCKS5 only)
    pub resolve_from_guest_cluster_dns: bool,
    /// Skip hostname resolution entirely (SOCKS5 only)
    pub disable_resolver: bool,
    /// Reach cloud provider APIs without going through the tunnel
    pub connect_directly_to_cloud_apis: bool,
    /// Volume holding a kubeconfig for the tenant API server
    pub kubeconfig_volume_name: Option<String>,
}

/// Add (or replace) the availability prober init container
///
/// The prober runs before every other init container.
pub fn inject_availability_prober(
    ctx: &WorkloadContext,
    pod_spec: &mut PodSpec,
    opts: &AvailabilityProberOptions,
) -> Result<(), AdaptError> {
    let mut command = vec![
        CONTROL_PLANE_OPERATOR_BINARY.to_string(),
        "availability-prober".to_string(),
        "--target".to_string(),
        AVAILABILITY_PROBER_TARGET.to_string(),
    ];
    let mut volume_mounts = Vec::new();

    if let Some(volume) = &opts.kubeconfig_volume_name {
        command.push(format!("--kubeconfig={PROBER_KUBECONFIG_DIR}/kubeconfig"));
        volume_mounts.push(VolumeMount {
            name: volume.clone(),
            mount_path: PROBER_KUBECONFIG_DIR.to_string(),
            ..VolumeMount::default()
        });
    }
    for api in &opts.required_apis {
        command.push(format!("--required-api={},{},{}", api.group, api.version, api.kind));
    }
    if opts.wait_for_infrastructure_resource {
        command.push("--wait-for-infrastructure-resource".to_string());
    }
    if let Some(selector) = &opts.wait_for_labeled_pods_gone {
        command.push(format!("--wait-for-labeled-pods-gone={selector}"));
    }
    if let Some(binding) = &opts.wait_for_cluster_role_binding {
        command.push(format!("--wait-for-cluster-rolebinding={binding}"));
    }

    let prober = Container {
        name: AVAILABILITY_PROBER_CONTAINER.to_string(),
        image: Some(ctx.release.resolve(AVAILABILITY_PROBER_IMAGE)?),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(command),
        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
        ..Container::default()
    };

    let init_containers = pod_spec.init_containers.get_or_insert_with(Vec::new);
    init_containers.retain(|c| c.name != AVAILABILITY_PROBER_CONTAINER);
    init_containers.insert(0, prober);
    Ok(())
}

/// Add (or replace) the konnectivity proxy sidecar and its volumes
pub fn inject_konnectivity_container(
    ctx: &WorkloadContext,
    pod_spec: &mut PodSpec,
    opts: &KonnectivityOptions,
) -> Result<(), AdaptError> {
    let mut args = vec![
        "run".to_string(),
        format!("--konnectivity-hostname={KONNECTIVITY_SERVER_HOST}"),
        format!("--konnectivity-port={KONNECTIVITY_SERVER_PORT}"),
    ];
    if opts.mode == KonnectivityMode::Socks5 {
        if opts.resolve_from_guest_cluster_dns {
            args.push("--resolve-from-guest-cluster-dns=true".to_string());
        }
        if opts.disable_resolver {
            args.push("--disable-resolver=true".to_string());
        }
    }
    if opts.connect_directly_to_cloud_apis {
        args.push("--connect-directly-to-cloud-apis=true".to_string());
    }

    let mut volume_mounts = vec![
        VolumeMount {
            name: KONNECTIVITY_CERT_VOLUME.to_string(),
            mount_path: "/etc/konnectivity/proxy-client".to_string(),
            ..VolumeMount::default()
        },
        VolumeMount {
            name: KONNECTIVITY_CA_VOLUME.to_string(),
            mount_path: "/etc/konnectivity/proxy-ca".to_string(),
            ..VolumeMount::default()
        },
    ];
    if let Some(volume) = &opts.kubeconfig_volume_name {
        args.push(format!("--kubeconfig={PROXY_KUBECONFIG_DIR}/kubeconfig"));
        volume_mounts.push(VolumeMount {
            name: volume.clone(),
            mount_path: PROXY_KUBECONFIG_DIR.to_string(),
            ..VolumeMount::default()
        });
    }

    upsert_container(
        &mut pod_spec.containers,
        Container {
            name: opts.mode.container_name().to_string(),
            image: Some(ctx.release.resolve(KONNECTIVITY_IMAGE)?),
            command: Some(vec![
                CONTROL_PLANE_OPERATOR_BINARY.to_string(),
                opts.mode.subcommand().to_string(),
            ]),
            args: Some(args),
            volume_mounts: Some(volume_mounts),
            ..Container::default()
        },
    );

    let volumes = pod_spec.volumes.get_or_insert_with(Vec::new);
    upsert_volume(
        volumes,
        Volume {
            name: KONNECTIVITY_CERT_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(KONNECTIVITY_CLIENT_SECRET.to_string()),
                default_mode: Some(0o640),
                ..SecretVolumeSource::default()
            }),
            ..Volume::default()
        },
    );
    upsert_volume(
        volumes,
        Volume {
            name: KONNECTIVITY_CA_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: KONNECTIVITY_CA_CONFIGMAP.to_string(),
                ..ConfigMapVolumeSource::default()
            }),
            ..Volume::default()
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::component::ReleaseImages;
    use crate::controller::store::MemoryObjectStore;
    use crate::crd::HostedControlPlane;

    fn context() -> WorkloadContext {
        let hcp: HostedControlPlane = serde_json::from_value(serde_json::json!({
            "apiVersion": "hypershift.openshift.io/v1beta1",
            "kind": "HostedControlPlane",
            "metadata": {"name": "example", "namespace": "clusters-example"},
            "spec": {
                "platform": {"type": "AWS"},
                "clusterID": "cluster-1234",
                "infraID": "example-x7k2p",
                "releaseImage": "quay.io/ocp-release:4.17.0"
            }
        }))
        .expect("valid hcp");
        let release = ReleaseImages::new(
            "4.17.0",
            BTreeMap::from([(
                "availability-prober".to_string(),
                "quay.io/release@sha256:prober".to_string(),
            )]),
            "quay.io/openshift",
        );
        WorkloadContext::new(
            Arc::new(hcp),
            Arc::new(release),
            Arc::new(MemoryObjectStore::new()),
        )
    }

    #[test]
    fn test_prober_is_first_init_container_and_idempotent() {
        let ctx = context();
        let mut spec = PodSpec {
            init_containers: Some(vec![Container {
                name: "setup".to_string(),
                ..Container::default()
            }]),
            ..PodSpec::default()
        };
        let opts = AvailabilityProberOptions {
            kubeconfig_volume_name: Some("kubeconfig".to_string()),
            required_apis: vec![RequiredApi::new("cluster.x-k8s.io", "v1beta1", "MachineDeployment")],
            ..AvailabilityProberOptions::default()
        };

        inject_availability_prober(&ctx, &mut spec, &opts).expect("injects");
        let once = spec.clone();
        inject_availability_prober(&ctx, &mut spec, &opts).expect("injects");
        assert_eq!(spec, once);

        let init = spec.init_containers.expect("init containers");
        assert_eq!(init.len(), 2);
        assert_eq!(init[0].name, AVAILABILITY_PROBER_CONTAINER);
        assert_eq!(init[0].image.as_deref(), Some("quay.io/release@sha256:prober"));
        let command = init[0].command.clone().unwrap_or_default();
        assert!(command.contains(&"--kubeconfig=/var/kubeconfig/kubeconfig".to_string()));
        assert!(command.contains(&"--required-api=cluster.x-k8s.io,v1beta1,MachineDeployment".to_string()));
    }

    #[test]
    fn test_konnectivity_sidecar_adds_volumes_once() {
        let ctx = context();
        let mut spec = PodSpec::default();
        let opts = KonnectivityOptions {
            mode: KonnectivityMode::Socks5,
            resolve_from_guest_cluster_dns: true,
            ..KonnectivityOptions::default()
        };

        inject_konnectivity_container(&ctx, &mut spec, &opts).expect("injects");
        inject_konnectivity_container(&ctx, &mut spec, &opts).expect("injects");

        assert_eq!(spec.containers.len(), 1);
        assert_eq!(spec.containers[0].name, "konnectivity-proxy-socks5");
        assert_eq!(
            spec.containers[0].image.as_deref(),
            Some("quay.io/openshift/apiserver-network-proxy:4.17.0")
        );
        assert_eq!(spec.volumes.as_ref().map(Vec::len), Some(2));
        let args = spec.containers[0].args.clone().unwrap_or_default();
        assert!(args.contains(&"--resolve-from-guest-cluster-dns=true".to_string()));
    }
}
