//! # Manifest Adapters
//!
//! Auxiliary manifests (Services, ServiceMonitors, RBAC, ...) are kept as
//! generic objects and adapted in place. Besides a free-form adapt function, an
//! adapter can carry a manifest-level predicate and a couple of built-in options
//! that most monitoring manifests need.

use std::fmt;
use std::sync::Arc;

use kube::core::DynamicObject;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::component::{finalize_metadata, AdaptError, ManifestAdaptFn, Predicate, WorkloadContext};
use crate::constants::CLUSTER_ID_LABEL;

/// Adapter attached to a named manifest
#[derive(Clone, Default)]
pub struct ManifestAdapter {
    adapt: Option<ManifestAdaptFn>,
    predicate: Option<Predicate>,
    namespace_selector: bool,
    cluster_id_endpoint: Option<usize>,
}

impl fmt::Debug for ManifestAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestAdapter")
            .field("adapt", &self.adapt.is_some())
            .field("predicate", &self.predicate.is_some())
            .field("namespace_selector", &self.namespace_selector)
            .field("cluster_id_endpoint", &self.cluster_id_endpoint)
            .finish()
    }
}

impl ManifestAdapter {
    /// Adapter running a function over the generic object
    pub fn new<F>(adapt: F) -> Self
    where
        F: Fn(&WorkloadContext, &mut DynamicObject) -> Result<(), AdaptError> + Send + Sync + 'static,
    {
        Self {
            adapt: Some(Arc::new(adapt)),
            ..Self::default()
        }
    }

    /// Adapter running a function over a typed view of the object
    ///
    /// The object is converted to `K`, adapted, and converted back.
    pub fn typed<K, F>(adapt: F) -> Self
    where
        K: Serialize + DeserializeOwned,
        F: Fn(&WorkloadContext, &mut K) -> Result<(), AdaptError> + Send + Sync + 'static,
    {
        Self::new(move |ctx, object| {
            let mut typed: K = serde_json::from_value(serde_json::to_value(&*object)?)?;
            adapt(ctx, &mut typed)?;
            *object = serde_json::from_value(serde_json::to_value(&typed)?)?;
            Ok(())
        })
    }

    /// Only render the manifest when `predicate` holds
    #[must_use]
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&WorkloadContext) -> Result<bool, AdaptError> + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Restrict a monitor's namespace selector to the tenant namespace
    #[must_use]
    pub fn with_namespace_selector(mut self) -> Self {
        self.namespace_selector = true;
        self
    }

    /// Label metrics scraped through endpoint `index` with the tenant cluster ID
    #[must_use]
    pub fn with_cluster_id_label(mut self, index: usize) -> Self {
        self.cluster_id_endpoint = Some(index);
        self
    }

    fn apply(&self, ctx: &WorkloadContext, name: &str, object: &mut DynamicObject) -> Result<(), AdaptError> {
        if self.namespace_selector {
            let spec = spec_mut(name, object)?;
            spec.insert(
                "namespaceSelector".to_string(),
                json!({ "matchNames": [ctx.namespace()] }),
            );
        }
        if let Some(index) = self.cluster_id_endpoint {
            apply_cluster_id_label(name, object, index, &ctx.hcp.spec.cluster_id)?;
        }
        if let Some(adapt) = &self.adapt {
            adapt(ctx, object)?;
        }
        Ok(())
    }
}

/// A named auxiliary manifest template and its adapter
#[derive(Debug, Clone)]
pub struct ManifestTemplate {
    pub name: String,
    pub object: DynamicObject,
    pub adapter: ManifestAdapter,
}

impl ManifestTemplate {
    pub fn from_yaml(name: impl Into<String>, yaml: &str) -> Result<Self, serde_yaml::Error> {
        Ok(Self {
            name: name.into(),
            object: serde_yaml::from_str(yaml)?,
            adapter: ManifestAdapter::default(),
        })
    }

    /// Render the manifest, or `None` when its predicate is false
    pub fn render(&self, ctx: &WorkloadContext) -> Result<Option<DynamicObject>, AdaptError> {
        if let Some(predicate) = &self.adapter.predicate {
            if !predicate(ctx)? {
                tracing::debug!(parent: &ctx.span, manifest = %self.name, "Manifest predicate is false, skipping");
                return Ok(None);
            }
        }
        let mut object = self.object.clone();
        self.adapter.apply(ctx, &self.name, &mut object)?;
        finalize_metadata(ctx, &mut object.metadata);
        Ok(Some(object))
    }
}

fn spec_mut<'a>(
    name: &str,
    object: &'a mut DynamicObject,
) -> Result<&'a mut serde_json::Map<String, Value>, AdaptError> {
    let data = object
        .data
        .as_object_mut()
        .ok_or_else(|| AdaptError::invalid(name, "object body is not a map"))?;
    data.entry("spec")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| AdaptError::invalid(name, "spec is not a map"))
}

/// Add (or replace) the `_id` metric relabeling on a monitor endpoint
///
/// ServiceMonitors keep endpoints under `endpoints`, PodMonitors under
/// `podMetricsEndpoints`.
fn apply_cluster_id_label(
    name: &str,
    object: &mut DynamicObject,
    index: usize,
    cluster_id: &str,
) -> Result<(), AdaptError> {
    let spec = spec_mut(name, object)?;
    let key = ["endpoints", "podMetricsEndpoints"]
        .into_iter()
        .find(|key| spec.get(*key).is_some_and(Value::is_array))
        .ok_or_else(|| AdaptError::invalid(name, "monitor has no endpoints"))?;
    let endpoints = spec
        .get_mut(key)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| AdaptError::invalid(name, "monitor has no endpoints"))?;
    let endpoint = endpoints
        .get_mut(index)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| AdaptError::invalid(name, format!("monitor has no endpoint {index}")))?;

    let relabelings = endpoint
        .entry("metricRelabelings")
        .or_insert_with(|| json!([]))
        .as_array_mut()
        .ok_or_else(|| AdaptError::invalid(name, "metricRelabelings is not a list"))?;
    relabelings.retain(|r| r.get("targetLabel").and_then(Value::as_str) != Some(CLUSTER_ID_LABEL));
    relabelings.push(json!({
        "action": "replace",
        "replacement": cluster_id,
        "targetLabel": CLUSTER_ID_LABEL,
    }));
    Ok(())
}
