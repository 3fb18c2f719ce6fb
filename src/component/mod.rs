//! # Component
//!
//! A component is one independently reconciled unit of control plane state:
//! a workload template (Deployment or StatefulSet) plus its auxiliary manifests,
//! the adapters that turn those templates into tenant-specific objects, an
//! optional predicate gating its presence, and the components it depends on.
//!
//! Components are built once at startup through [`ComponentBuilder`] and are
//! immutable afterwards; the same value renders objects for every tenant.
//!
//! Rendering a workload runs, in order:
//!
//! 1. default setup (name, replicas from the availability policy, labels)
//! 2. the component's workload adapter
//! 3. image resolution against the release
//! 4. sidecar injection (availability prober, then konnectivity proxy)
//! 5. the rollout fingerprint annotation
//! 6. object finalization (namespace, owner reference, managed-by label)

mod builder;
mod context;
mod defaults;
mod error;
mod manifest;
mod sidecar;
mod workload;

use std::fmt;
use std::sync::Arc;

use kube::core::DynamicObject;

pub use builder::ComponentBuilder;
pub use context::{ReleaseImages, WorkloadContext};
pub use defaults::finalize_metadata;
pub use error::{AdaptError, ConfigurationError};
pub use manifest::{ManifestAdapter, ManifestTemplate};
pub use sidecar::{
    inject_availability_prober, inject_konnectivity_container, AvailabilityProberOptions,
    KonnectivityMode, KonnectivityOptions, RequiredApi,
};
pub use workload::{
    update_container, update_volume, upsert_container, upsert_volume, RolloutState, Workload,
    WorkloadKind,
};

use crate::constants::ROLLOUT_FINGERPRINT_ANNOTATION;

/// Gate deciding whether a component (or manifest) is reconciled in a context
pub type Predicate = Arc<dyn Fn(&WorkloadContext) -> Result<bool, AdaptError> + Send + Sync>;

/// Mutates a workload template into its tenant-specific form
pub type WorkloadAdaptFn =
    Arc<dyn Fn(&WorkloadContext, &mut Workload) -> Result<(), AdaptError> + Send + Sync>;

/// Mutates an auxiliary manifest into its tenant-specific form
pub type ManifestAdaptFn =
    Arc<dyn Fn(&WorkloadContext, &mut DynamicObject) -> Result<(), AdaptError> + Send + Sync>;

/// Scheduling and access options shared by all workloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentOptions {
    /// Spread replicas across zones when the control plane is highly available
    pub multi_zone_spread: bool,
    /// Mount a service account token for the management cluster API
    pub needs_management_kas_access: bool,
    /// Workload serves tenant requests and is scheduled on request-serving nodes
    pub is_request_serving: bool,
}

/// A registered control plane component
#[derive(Clone)]
pub struct Component {
    pub(crate) name: String,
    pub(crate) workload: Workload,
    pub(crate) manifests: Vec<ManifestTemplate>,
    pub(crate) adapter: Option<WorkloadAdaptFn>,
    pub(crate) predicate: Option<Predicate>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) rollout_secrets: Vec<String>,
    pub(crate) rollout_config_maps: Vec<String>,
    pub(crate) availability_prober: Option<AvailabilityProberOptions>,
    pub(crate) konnectivity: Option<KonnectivityOptions>,
    pub(crate) options: ComponentOptions,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("dependencies", &self.dependencies)
            .field(
                "manifests",
                &self.manifests.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Component {
    /// Start building a Deployment-backed component
    #[must_use]
    pub fn deployment(name: impl Into<String>) -> ComponentBuilder {
        ComponentBuilder::new(name, WorkloadKind::Deployment)
    }

    /// Start building a StatefulSet-backed component
    #[must_use]
    pub fn statefulset(name: impl Into<String>) -> ComponentBuilder {
        ComponentBuilder::new(name, WorkloadKind::StatefulSet)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> WorkloadKind {
        self.workload.kind()
    }

    /// Names of components that must be available first
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Secrets whose content triggers a rollout
    #[must_use]
    pub fn rollout_secrets(&self) -> &[String] {
        &self.rollout_secrets
    }

    /// ConfigMaps whose content triggers a rollout
    #[must_use]
    pub fn rollout_config_maps(&self) -> &[String] {
        &self.rollout_config_maps
    }

    #[must_use]
    pub fn options(&self) -> ComponentOptions {
        self.options
    }

    #[must_use]
    pub fn manifests(&self) -> &[ManifestTemplate] {
        &self.manifests
    }

    /// Evaluate the component predicate; components without one always proceed
    pub fn should_reconcile(&self, ctx: &WorkloadContext) -> Result<bool, AdaptError> {
        match &self.predicate {
            Some(predicate) => predicate(ctx),
            None => Ok(true),
        }
    }

    /// Render every auxiliary manifest whose own predicate passes
    ///
    /// Manifests are returned in registration order, keyed by template name.
    pub fn render_manifests(
        &self,
        ctx: &WorkloadContext,
    ) -> Result<Vec<(String, DynamicObject)>, AdaptError> {
        let mut rendered = Vec::with_capacity(self.manifests.len());
        for template in &self.manifests {
            if let Some(object) = template.render(ctx)? {
                rendered.push((template.name.clone(), object));
            }
        }
        Ok(rendered)
    }

    /// Render the workload
    ///
    /// `fingerprint` is written to the pod template so that a changed
    /// configuration source produces a new workload revision.
    pub fn render_workload(
        &self,
        ctx: &WorkloadContext,
        fingerprint: Option<&str>,
    ) -> Result<Workload, AdaptError> {
        let mut workload = self.workload.clone();
        defaults::apply_workload_defaults(self, ctx, &mut workload)?;

        if let Some(adapt) = &self.adapter {
            adapt(ctx, &mut workload)?;
        }
        defaults::resolve_images(ctx, &mut workload)?;

        if let Some(opts) = &self.availability_prober {
            inject_availability_prober(ctx, workload.pod_spec_mut()?, opts)?;
        }
        if let Some(opts) = &self.konnectivity {
            inject_konnectivity_container(ctx, workload.pod_spec_mut()?, opts)?;
        }

        if let Some(fingerprint) = fingerprint {
            workload
                .pod_template_annotations_mut()?
                .insert(ROLLOUT_FINGERPRINT_ANNOTATION.to_string(), fingerprint.to_string());
        }

        finalize_metadata(ctx, workload.metadata_mut());
        Ok(workload)
    }
}
