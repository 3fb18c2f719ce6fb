//! # Component Builder
//!
//! Collects a component's templates, adapters and relationships, then validates
//! them in [`ComponentBuilder::build`]. Every invalid registration surfaces as a
//! [`ConfigurationError`] so the process fails before reconciling anything.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::component::{
    AdaptError, AvailabilityProberOptions, Component, ComponentOptions, ConfigurationError,
    KonnectivityOptions, ManifestAdapter, ManifestTemplate, Predicate, Workload, WorkloadAdaptFn,
    WorkloadContext, WorkloadKind,
};

static DNS1123_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("Failed to compile DNS-1123 label regex")
});
const DNS1123_LABEL_MAX_LEN: usize = 63;
const WORKLOAD_TEMPLATE: &str = "workload";

/// Builder for [`Component`]
#[must_use]
pub struct ComponentBuilder {
    name: String,
    kind: WorkloadKind,
    workload_yaml: Option<String>,
    manifests: Vec<(String, String)>,
    manifest_adapters: Vec<(String, ManifestAdapter)>,
    adapter: Option<WorkloadAdaptFn>,
    predicate: Option<Predicate>,
    dependencies: Vec<String>,
    rollout_secrets: Vec<String>,
    rollout_config_maps: Vec<String>,
    availability_prober: Option<AvailabilityProberOptions>,
    konnectivity: Option<KonnectivityOptions>,
    options: ComponentOptions,
}

impl std::fmt::Debug for ComponentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentBuilder")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl ComponentBuilder {
    pub(crate) fn new(name: impl Into<String>, kind: WorkloadKind) -> Self {
        Self {
            name: name.into(),
            kind,
            workload_yaml: None,
            manifests: Vec::new(),
            manifest_adapters: Vec::new(),
            adapter: None,
            predicate: None,
            dependencies: Vec::new(),
            rollout_secrets: Vec::new(),
            rollout_config_maps: Vec::new(),
            availability_prober: None,
            konnectivity: None,
            options: ComponentOptions::default(),
        }
    }

    /// Workload template (YAML)
    pub fn with_workload(mut self, yaml: impl Into<String>) -> Self {
        self.workload_yaml = Some(yaml.into());
        self
    }

    /// Auxiliary manifest template (YAML), rendered in registration order
    pub fn with_manifest(mut self, name: impl Into<String>, yaml: impl Into<String>) -> Self {
        self.manifests.push((name.into(), yaml.into()));
        self
    }

    /// Adapter for a manifest registered with [`Self::with_manifest`]
    pub fn with_manifest_adapter(mut self, name: impl Into<String>, adapter: ManifestAdapter) -> Self {
        self.manifest_adapters.push((name.into(), adapter));
        self
    }

    /// Primary workload adapter
    pub fn with_adapter<F>(mut self, adapt: F) -> Self
    where
        F: Fn(&WorkloadContext, &mut Workload) -> Result<(), AdaptError> + Send + Sync + 'static,
    {
        self.adapter = Some(Arc::new(adapt));
        self
    }

    /// Gate deciding whether the component is reconciled at all
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&WorkloadContext) -> Result<bool, AdaptError> + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn rollout_on_secret_change<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rollout_secrets.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn rollout_on_config_map_change<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rollout_config_maps.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn inject_availability_prober(mut self, opts: AvailabilityProberOptions) -> Self {
        self.availability_prober = Some(opts);
        self
    }

    pub fn inject_konnectivity_container(mut self, opts: KonnectivityOptions) -> Self {
        self.konnectivity = Some(opts);
        self
    }

    pub fn with_options(mut self, options: ComponentOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate and freeze the component
    ///
    /// # Errors
    ///
    /// - the name is empty or not a DNS-1123 label
    /// - a template is missing or does not parse
    /// - the workload template kind differs from the declared kind
    /// - a manifest adapter names an unknown manifest
    /// - the component depends on itself
    pub fn build(self) -> Result<Component, ConfigurationError> {
        validate_name(&self.name)?;

        let workload = self.parse_workload()?;

        let mut manifests: Vec<ManifestTemplate> = Vec::with_capacity(self.manifests.len());
        for (manifest, yaml) in &self.manifests {
            if manifests.iter().any(|m| &m.name == manifest) {
                return Err(self.invalid_template(manifest, "manifest registered more than once"));
            }
            let template = ManifestTemplate::from_yaml(manifest.clone(), yaml)
                .map_err(|e| self.invalid_template(manifest, e.to_string()))?;
            manifests.push(template);
        }

        for (manifest, adapter) in self.manifest_adapters {
            let template = manifests
                .iter_mut()
                .find(|m| m.name == manifest)
                .ok_or_else(|| ConfigurationError::UnknownManifest {
                    component: self.name.clone(),
                    manifest: manifest.clone(),
                })?;
            template.adapter = adapter;
        }

        if self.dependencies.iter().any(|d| d == &self.name) {
            return Err(ConfigurationError::DependencyCycle {
                cycle: vec![self.name.clone(), self.name.clone()],
            });
        }
        let mut dependencies: Vec<String> = Vec::with_capacity(self.dependencies.len());
        for dependency in self.dependencies {
            if !dependencies.contains(&dependency) {
                dependencies.push(dependency);
            }
        }

        Ok(Component {
            name: self.name,
            workload,
            manifests,
            adapter: self.adapter,
            predicate: self.predicate,
            dependencies,
            rollout_secrets: self.rollout_secrets,
            rollout_config_maps: self.rollout_config_maps,
            availability_prober: self.availability_prober,
            konnectivity: self.konnectivity,
            options: self.options,
        })
    }

    fn parse_workload(&self) -> Result<Workload, ConfigurationError> {
        let yaml = self
            .workload_yaml
            .as_deref()
            .ok_or_else(|| self.invalid_template(WORKLOAD_TEMPLATE, "no workload template registered"))?;

        let raw: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| self.invalid_template(WORKLOAD_TEMPLATE, e.to_string()))?;
        let found = raw.get("kind").and_then(serde_yaml::Value::as_str).unwrap_or_default();
        if found != self.kind.as_str() {
            return Err(ConfigurationError::WorkloadKindMismatch {
                component: self.name.clone(),
                expected: self.kind.to_string(),
                found: found.to_string(),
            });
        }

        let workload = Workload::from_yaml(self.kind, yaml)
            .map_err(|e| self.invalid_template(WORKLOAD_TEMPLATE, e.to_string()))?;
        let has_pod_spec = match &workload {
            Workload::Deployment(d) => d.spec.as_ref().and_then(|s| s.template.spec.as_ref()).is_some(),
            Workload::StatefulSet(s) => s.spec.as_ref().and_then(|s| s.template.spec.as_ref()).is_some(),
        };
        if !has_pod_spec {
            return Err(self.invalid_template(WORKLOAD_TEMPLATE, "workload has no pod template spec"));
        }
        Ok(workload)
    }

    fn invalid_template(&self, manifest: &str, message: impl Into<String>) -> ConfigurationError {
        ConfigurationError::InvalidTemplate {
            component: self.name.clone(),
            manifest: manifest.to_string(),
            message: message.into(),
        }
    }
}

fn validate_name(name: &str) -> Result<(), ConfigurationError> {
    if name.is_empty() {
        return Err(ConfigurationError::MissingName);
    }
    let valid = name.len() <= DNS1123_LABEL_MAX_LEN
        && DNS1123_LABEL.is_match(name);
    if !valid {
        return Err(ConfigurationError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}
