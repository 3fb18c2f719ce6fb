//! # Workload Defaults
//!
//! Setup shared by every component workload, image resolution, and the
//! metadata finalization applied to every rendered object.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, TopologySpreadConstraint};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::Resource;

use crate::component::{AdaptError, Component, Workload, WorkloadContext};
use crate::constants::{
    CONTROL_PLANE_COMPONENT_LABEL, FIELD_MANAGER, MANAGED_BY_LABEL, REQUEST_SERVING_LABEL,
    ZONE_TOPOLOGY_KEY,
};
use crate::crd::{AvailabilityPolicy, HostedControlPlane};

pub(crate) fn apply_workload_defaults(
    component: &Component,
    ctx: &WorkloadContext,
    workload: &mut Workload,
) -> Result<(), AdaptError> {
    let name = component.name();
    let options = component.options();
    let policy = ctx.hcp.spec.controller_availability_policy;

    workload.metadata_mut().name = Some(name.to_string());
    workload.set_replicas(policy.replicas())?;

    let labels = workload
        .pod_template_metadata_mut()?
        .labels
        .get_or_insert_with(BTreeMap::new);
    labels.insert("app".to_string(), name.to_string());
    labels.insert(CONTROL_PLANE_COMPONENT_LABEL.to_string(), name.to_string());
    if options.is_request_serving {
        labels.insert(REQUEST_SERVING_LABEL.to_string(), "true".to_string());
    }

    let pod_spec = workload.pod_spec_mut()?;
    if !options.needs_management_kas_access {
        pod_spec.automount_service_account_token = Some(false);
    }

    if options.multi_zone_spread && policy == AvailabilityPolicy::HighlyAvailable {
        let constraints = pod_spec.topology_spread_constraints.get_or_insert_with(Vec::new);
        constraints.retain(|c| c.topology_key != ZONE_TOPOLOGY_KEY);
        constraints.push(TopologySpreadConstraint {
            max_skew: 1,
            topology_key: ZONE_TOPOLOGY_KEY.to_string(),
            when_unsatisfiable: "DoNotSchedule".to_string(),
            label_selector: Some(LabelSelector {
                match_labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
                ..LabelSelector::default()
            }),
            ..TopologySpreadConstraint::default()
        });
    }
    Ok(())
}

/// Resolve every container image against the release
///
/// Runs after the component adapter, so an image the adapter set explicitly
/// (a full pull spec) is kept as is.
pub(crate) fn resolve_images(ctx: &WorkloadContext, workload: &mut Workload) -> Result<(), AdaptError> {
    let pod_spec = workload.pod_spec_mut()?;
    for container in pod_spec.containers.iter_mut() {
        resolve_image(ctx, container)?;
    }
    for container in pod_spec.init_containers.iter_mut().flatten() {
        resolve_image(ctx, container)?;
    }
    Ok(())
}

/// Replace a container's image reference with its resolved pull spec
///
/// A container without an image is resolved by its own name.
fn resolve_image(ctx: &WorkloadContext, container: &mut Container) -> Result<(), AdaptError> {
    let reference = container.image.as_deref().unwrap_or(&container.name);
    container.image = Some(ctx.release.resolve(reference)?);
    Ok(())
}

/// Scope an object to the tenant: namespace, owner reference and managed-by label
///
/// The owner reference is only set once the HostedControlPlane has a UID.
pub fn finalize_metadata(ctx: &WorkloadContext, metadata: &mut ObjectMeta) {
    metadata.namespace = Some(ctx.namespace().to_string());
    metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(MANAGED_BY_LABEL.to_string(), FIELD_MANAGER.to_string());

    if let Some(owner) = owner_reference(&ctx.hcp) {
        let owners = metadata.owner_references.get_or_insert_with(Vec::new);
        owners.retain(|o| o.uid != owner.uid);
        owners.push(owner);
    }
}

fn owner_reference(hcp: &HostedControlPlane) -> Option<OwnerReference> {
    Some(OwnerReference {
        api_version: HostedControlPlane::api_version(&()).to_string(),
        kind: HostedControlPlane::kind(&()).to_string(),
        name: hcp.metadata.name.clone()?,
        uid: hcp.metadata.uid.clone()?,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}
