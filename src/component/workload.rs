//! # Workloads
//!
//! Tagged wrapper over the two workload kinds a component can own, with the
//! kind-agnostic accessors adapters need (pod spec, replicas, template metadata).

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Volume};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;

use crate::component::AdaptError;

/// Kind of workload a component owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    /// Kubernetes kind name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
        }
    }

    /// API version shared by both kinds
    #[must_use]
    pub fn api_version(&self) -> &'static str {
        "apps/v1"
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the workload controller has finished rolling out the current spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutState {
    Complete,
    InProgress,
}

/// A Deployment or StatefulSet
#[derive(Debug, Clone, PartialEq)]
pub enum Workload {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
}

impl Workload {
    /// Parse a YAML template of the given kind
    pub fn from_yaml(kind: WorkloadKind, yaml: &str) -> Result<Self, serde_yaml::Error> {
        Ok(match kind {
            WorkloadKind::Deployment => Workload::Deployment(serde_yaml::from_str(yaml)?),
            WorkloadKind::StatefulSet => Workload::StatefulSet(serde_yaml::from_str(yaml)?),
        })
    }

    /// Read a workload back from a generic object
    pub fn from_dynamic(kind: WorkloadKind, object: &DynamicObject) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(object)?;
        Ok(match kind {
            WorkloadKind::Deployment => Workload::Deployment(serde_json::from_value(value)?),
            WorkloadKind::StatefulSet => Workload::StatefulSet(serde_json::from_value(value)?),
        })
    }

    /// Convert to a generic object for diffing and applying
    pub fn to_dynamic(&self) -> Result<DynamicObject, serde_json::Error> {
        let value = match self {
            Workload::Deployment(d) => serde_json::to_value(d)?,
            Workload::StatefulSet(s) => serde_json::to_value(s)?,
        };
        serde_json::from_value(value)
    }

    #[must_use]
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Deployment(_) => WorkloadKind::Deployment,
            Workload::StatefulSet(_) => WorkloadKind::StatefulSet,
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Workload::Deployment(d) => &d.metadata,
            Workload::StatefulSet(s) => &s.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Workload::Deployment(d) => &mut d.metadata,
            Workload::StatefulSet(s) => &mut s.metadata,
        }
    }

    /// Workload name, empty when the template has none
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn replicas(&self) -> Option<i32> {
        match self {
            Workload::Deployment(d) => d.spec.as_ref().and_then(|s| s.replicas),
            Workload::StatefulSet(s) => s.spec.as_ref().and_then(|s| s.replicas),
        }
    }

    pub fn set_replicas(&mut self, replicas: i32) -> Result<(), AdaptError> {
        let name = self.name().to_string();
        match self {
            Workload::Deployment(d) => {
                d.spec
                    .as_mut()
                    .ok_or_else(|| AdaptError::invalid(name, "deployment has no spec"))?
                    .replicas = Some(replicas);
            }
            Workload::StatefulSet(s) => {
                s.spec
                    .as_mut()
                    .ok_or_else(|| AdaptError::invalid(name, "statefulset has no spec"))?
                    .replicas = Some(replicas);
            }
        }
        Ok(())
    }

    pub fn pod_template_mut(&mut self) -> Result<&mut PodTemplateSpec, AdaptError> {
        let name = self.name().to_string();
        match self {
            Workload::Deployment(d) => d
                .spec
                .as_mut()
                .map(|s| &mut s.template)
                .ok_or_else(|| AdaptError::invalid(name, "deployment has no spec")),
            Workload::StatefulSet(s) => s
                .spec
                .as_mut()
                .map(|s| &mut s.template)
                .ok_or_else(|| AdaptError::invalid(name, "statefulset has no spec")),
        }
    }

    pub fn pod_spec_mut(&mut self) -> Result<&mut PodSpec, AdaptError> {
        let name = self.name().to_string();
        self.pod_template_mut()?
            .spec
            .as_mut()
            .ok_or_else(|| AdaptError::invalid(name, "pod template has no spec"))
    }

    /// Pod template metadata, created if absent
    pub fn pod_template_metadata_mut(&mut self) -> Result<&mut ObjectMeta, AdaptError> {
        Ok(self.pod_template_mut()?.metadata.get_or_insert_with(ObjectMeta::default))
    }

    /// Pod template annotations, created if absent
    pub fn pod_template_annotations_mut(
        &mut self,
    ) -> Result<&mut BTreeMap<String, String>, AdaptError> {
        Ok(self
            .pod_template_metadata_mut()?
            .annotations
            .get_or_insert_with(BTreeMap::new))
    }

    /// Pod template annotation value, if set
    #[must_use]
    pub fn pod_template_annotation(&self, key: &str) -> Option<&str> {
        let template = match self {
            Workload::Deployment(d) => d.spec.as_ref().map(|s| &s.template),
            Workload::StatefulSet(s) => s.spec.as_ref().map(|s| &s.template),
        }?;
        template
            .metadata
            .as_ref()?
            .annotations
            .as_ref()?
            .get(key)
            .map(String::as_str)
    }

    /// Whether the workload controller has converged on the current generation
    ///
    /// A workload scaled to zero is complete once the controller has observed it.
    #[must_use]
    pub fn rollout_state(&self) -> RolloutState {
        let generation = self.metadata().generation.unwrap_or(0);
        let desired = self.replicas().unwrap_or(1);
        let complete = match self {
            Workload::Deployment(d) => d.status.as_ref().is_some_and(|status| {
                status.observed_generation.unwrap_or(0) >= generation
                    && status.updated_replicas.unwrap_or(0) >= desired
                    && status.available_replicas.unwrap_or(0) >= desired
            }),
            Workload::StatefulSet(s) => s.status.as_ref().is_some_and(|status| {
                let revisions_match = match (&status.current_revision, &status.update_revision) {
                    (Some(current), Some(update)) => current == update,
                    _ => true,
                };
                status.observed_generation.unwrap_or(0) >= generation
                    && status.updated_replicas.unwrap_or(0) >= desired
                    && status.ready_replicas.unwrap_or(0) >= desired
                    && revisions_match
            }),
        };
        if complete {
            RolloutState::Complete
        } else {
            RolloutState::InProgress
        }
    }
}

/// Mutate the named container
pub fn update_container<F>(containers: &mut [Container], name: &str, f: F) -> Result<(), AdaptError>
where
    F: FnOnce(&mut Container),
{
    let container = containers
        .iter_mut()
        .find(|c| c.name == name)
        .ok_or_else(|| AdaptError::ContainerNotFound {
            name: name.to_string(),
        })?;
    f(container);
    Ok(())
}

/// Mutate the named volume
pub fn update_volume<F>(volumes: &mut [Volume], name: &str, f: F) -> Result<(), AdaptError>
where
    F: FnOnce(&mut Volume),
{
    let volume = volumes
        .iter_mut()
        .find(|v| v.name == name)
        .ok_or_else(|| AdaptError::VolumeNotFound {
            name: name.to_string(),
        })?;
    f(volume);
    Ok(())
}

/// Insert a container, replacing any existing one with the same name
pub fn upsert_container(containers: &mut Vec<Container>, container: Container) {
    match containers.iter_mut().find(|c| c.name == container.name) {
        Some(existing) => *existing = container,
        None => containers.push(container),
    }
}

/// Insert a volume, replacing any existing one with the same name
pub fn upsert_volume(volumes: &mut Vec<Volume>, volume: Volume) {
    match volumes.iter_mut().find(|v| v.name == volume.name) {
        Some(existing) => *existing = volume,
        None => volumes.push(volume),
    }
}
