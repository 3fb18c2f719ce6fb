//! # Component Catalog
//!
//! The control plane components this operator reconciles for every tenant.
//!
//! | Component | Workload | Depends on |
//! |---|---|---|
//! | `etcd` | StatefulSet | |
//! | `kube-apiserver` | Deployment | `etcd` |
//! | `cluster-autoscaler` | Deployment | `kube-apiserver` |
//! | `karpenter-operator` | Deployment | `kube-apiserver` |
//!
//! Templates are embedded from `assets/<component>/`.

pub mod cluster_autoscaler;
pub mod etcd;
pub mod karpenter_operator;
pub mod kube_apiserver;

use k8s_openapi::api::rbac::v1::RoleBinding;

use crate::component::{Component, ConfigurationError, ManifestAdapter};
use crate::controller::registry::ComponentRegistry;

pub use cluster_autoscaler::IgnoreLabelTables;

/// Every catalog component, in registration order
///
/// # Errors
///
/// Returns the first [`ConfigurationError`] raised by a component builder.
pub fn default_components(labels: &IgnoreLabelTables) -> Result<Vec<Component>, ConfigurationError> {
    Ok(vec![
        etcd::component()?,
        kube_apiserver::component()?,
        cluster_autoscaler::component(labels.clone())?,
        karpenter_operator::component()?,
    ])
}

/// Validated registry over the default catalog
///
/// # Errors
///
/// Returns a [`ConfigurationError`] for invalid registrations, unknown
/// dependencies or dependency cycles.
pub fn default_registry() -> Result<ComponentRegistry, ConfigurationError> {
    ComponentRegistry::new(default_components(&IgnoreLabelTables::defaults())?)
}

/// Point every RoleBinding subject at the tenant namespace
pub(crate) fn tenant_role_binding() -> ManifestAdapter {
    ManifestAdapter::typed::<RoleBinding, _>(|ctx, binding| {
        for subject in binding.subjects.iter_mut().flatten() {
            subject.namespace = Some(ctx.namespace().to_string());
        }
        Ok(())
    })
}
