//! # Workload Context
//!
//! Per-pass, per-tenant value handed to predicates and adapters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;

use crate::component::AdaptError;
use crate::controller::store::ObjectStore;
use crate::crd::HostedControlPlane;

/// Key in the release ConfigMap holding the release version
const RELEASE_VERSION_KEY: &str = "version";

/// Everything a component needs to render itself for one tenant cluster
///
/// Owned by a single reconciliation pass; never shared between tenants.
#[derive(Clone)]
pub struct WorkloadContext {
    /// The tenant's HostedControlPlane (desired spec + last status)
    pub hcp: Arc<HostedControlPlane>,
    /// Release image metadata
    pub release: Arc<ReleaseImages>,
    /// Object store handle
    pub store: Arc<dyn ObjectStore>,
    /// Logger for this pass; adapters log inside it
    pub span: tracing::Span,
}

impl fmt::Debug for WorkloadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadContext")
            .field("tenant", &self.tenant_key())
            .field("release", &self.release.version)
            .finish_non_exhaustive()
    }
}

impl WorkloadContext {
    /// Build a context with a span scoped to the tenant
    #[must_use]
    pub fn new(
        hcp: Arc<HostedControlPlane>,
        release: Arc<ReleaseImages>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let span = tracing::info_span!(
            "controller.reconcile",
            tenant.namespace = hcp.tenant_namespace(),
            tenant.name = hcp.metadata.name.as_deref().unwrap_or("unknown"),
        );
        Self {
            hcp,
            release,
            store,
            span,
        }
    }

    /// Tenant namespace every component object lives in
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.hcp.tenant_namespace()
    }

    /// `namespace/name` of the HostedControlPlane
    #[must_use]
    pub fn tenant_key(&self) -> String {
        format!(
            "{}/{}",
            self.hcp.tenant_namespace(),
            self.hcp.metadata.name.as_deref().unwrap_or("unknown")
        )
    }
}

/// Release payload metadata: image pull specs by name plus the release version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseImages {
    pub version: String,
    pub images: BTreeMap<String, String>,
    /// Registry used for images absent from `images`
    pub default_registry: String,
}

impl ReleaseImages {
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        images: BTreeMap<String, String>,
        default_registry: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            images,
            default_registry: default_registry.into(),
        }
    }

    /// Read release metadata from a ConfigMap
    ///
    /// Every data key except `version` is an image name mapped to its pull spec.
    #[must_use]
    pub fn from_config_map(config_map: &ConfigMap, default_registry: &str) -> Self {
        let mut images = config_map.data.clone().unwrap_or_default();
        let version = images.remove(RELEASE_VERSION_KEY).unwrap_or_default();
        Self::new(version, images, default_registry)
    }

    /// Pull spec for a named release image
    #[must_use]
    pub fn image(&self, name: &str) -> Option<&str> {
        self.images.get(name).map(String::as_str)
    }

    /// Resolve a container image reference
    ///
    /// Release image names map to their pull spec. Bare names (no registry, tag or
    /// digest) fall back to `{default_registry}/{name}:{version}`. Anything else is
    /// already a full reference and is returned unchanged.
    pub fn resolve(&self, reference: &str) -> Result<String, AdaptError> {
        if let Some(pull_spec) = self.image(reference) {
            return Ok(pull_spec.to_string());
        }
        let is_bare = !reference.contains(['/', ':', '@']);
        if !is_bare {
            return Ok(reference.to_string());
        }
        if self.version.is_empty() || self.default_registry.is_empty() {
            return Err(AdaptError::ImageNotResolved {
                name: reference.to_string(),
            });
        }
        Ok(format!(
            "{}/{}:{}",
            self.default_registry.trim_end_matches('/'),
            reference,
            self.version
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release() -> ReleaseImages {
        ReleaseImages::new(
            "4.17.0",
            BTreeMap::from([(
                "cluster-autoscaler".to_string(),
                "quay.io/release@sha256:aaa".to_string(),
            )]),
            "quay.io/openshift/",
        )
    }

    #[test]
    fn test_resolve_release_image() {
        assert_eq!(
            release().resolve("cluster-autoscaler").expect("resolvable"),
            "quay.io/release@sha256:aaa"
        );
    }

    #[test]
    fn test_resolve_bare_name_uses_default_registry() {
        assert_eq!(
            release().resolve("etcd").expect("resolvable"),
            "quay.io/openshift/etcd:4.17.0"
        );
    }

    #[test]
    fn test_full_reference_is_unchanged() {
        assert_eq!(
            release().resolve("registry.local/etcd:v3").expect("resolvable"),
            "registry.local/etcd:v3"
        );
    }

    #[test]
    fn test_bare_name_without_version_fails() {
        let release = ReleaseImages::default();
        assert!(matches!(
            release.resolve("etcd"),
            Err(AdaptError::ImageNotResolved { .. })
        ));
    }

    #[test]
    fn test_from_config_map_splits_version() {
        let cm: ConfigMap = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "release-images"},
            "data": {"version": "4.17.1", "etcd": "quay.io/etcd@sha256:bbb"}
        }))
        .expect("valid configmap");
        let release = ReleaseImages::from_config_map(&cm, "quay.io/openshift");
        assert_eq!(release.version, "4.17.1");
        assert_eq!(release.image("etcd"), Some("quay.io/etcd@sha256:bbb"));
        assert_eq!(release.image("version"), None);
    }
}
