//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config::ControllerConfig`]).

/// Field manager used for server-side apply of control plane objects
pub const FIELD_MANAGER: &str = "control-plane-operator";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default namespace the controller runs in
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "hypershift";

/// Default name of the ConfigMap holding release image pull specs
pub const DEFAULT_RELEASE_IMAGES_CONFIGMAP: &str = "release-images";

/// Registry used for images that are not part of the release metadata
pub const DEFAULT_IMAGE_REGISTRY: &str = "quay.io/openshift";

/// Maximum number of create-or-update attempts for a single object
pub const DEFAULT_APPLY_MAX_ATTEMPTS: u32 = 5;

/// Initial delay between apply retries (milliseconds)
pub const DEFAULT_APPLY_BACKOFF_START_MS: u64 = 100;

/// Maximum delay between apply retries (milliseconds)
pub const DEFAULT_APPLY_BACKOFF_MAX_MS: u64 = 2_000;

/// Periodic requeue interval after a fully available pass (seconds)
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Requeue interval while components are still converging (seconds)
pub const DEFAULT_CONVERGING_REQUEUE_SECS: u64 = 30;

/// Deadline for a single reconciliation pass before it is cancelled (seconds)
pub const DEFAULT_PASS_TIMEOUT_SECS: u64 = 120;

/// Default maximum number of tenant clusters reconciled concurrently
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Minimum error backoff (minutes)
pub const ERROR_BACKOFF_MIN_MINUTES: u64 = 1;

/// Maximum error backoff (minutes)
pub const ERROR_BACKOFF_MAX_MINUTES: u64 = 10;

/// Pod template annotation carrying the rollout fingerprint
pub const ROLLOUT_FINGERPRINT_ANNOTATION: &str =
    "component.hypershift.openshift.io/config-hash";

/// Label identifying which control plane component owns a pod
pub const CONTROL_PLANE_COMPONENT_LABEL: &str = "hypershift.openshift.io/control-plane-component";

/// Label marking objects managed by this controller
pub const MANAGED_BY_LABEL: &str = "hypershift.openshift.io/managed-by";

/// Label marking request serving pods
pub const REQUEST_SERVING_LABEL: &str = "hypershift.openshift.io/request-serving-component";

/// Label added to monitoring endpoints to identify the tenant cluster
pub const CLUSTER_ID_LABEL: &str = "_id";

/// HostedControlPlane annotation that scales the cluster autoscaler to zero
pub const DISABLE_CLUSTER_AUTOSCALER_ANNOTATION: &str =
    "hypershift.openshift.io/disable-cluster-autoscaler";

/// HostedControlPlane annotation overriding the cluster autoscaler image
pub const CLUSTER_AUTOSCALER_IMAGE_ANNOTATION: &str =
    "hypershift.openshift.io/cluster-autoscaler-image";

/// Topology key used for multi-zone spreading
pub const ZONE_TOPOLOGY_KEY: &str = "topology.kubernetes.io/zone";
