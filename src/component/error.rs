//! # Component Errors
//!
//! Errors raised while registering components (fatal at startup) and while
//! adapting templates during a reconciliation pass (isolated per component).

use thiserror::Error;

/// Invalid component registration
///
/// Any of these prevents the orchestrator from starting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("component name is required")]
    MissingName,
    #[error("component name '{name}' is not a valid DNS-1123 label")]
    InvalidName { name: String },
    #[error("component '{name}' is registered more than once")]
    DuplicateName { name: String },
    #[error("component '{component}' depends on unknown component '{dependency}'")]
    UnresolvedDependency {
        component: String,
        dependency: String,
    },
    #[error("component dependency cycle: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },
    #[error("component '{component}' has an invalid template '{manifest}': {message}")]
    InvalidTemplate {
        component: String,
        manifest: String,
        message: String,
    },
    #[error("component '{component}' registers an adapter for unknown manifest '{manifest}'")]
    UnknownManifest { component: String, manifest: String },
    #[error("component '{component}' declares a {expected} but its template is a {found}")]
    WorkloadKindMismatch {
        component: String,
        expected: String,
        found: String,
    },
}

/// A manifest or workload adapter failed
///
/// Recorded on the component as `Degraded`; the pass continues.
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error("container '{name}' not found in workload")]
    ContainerNotFound { name: String },
    #[error("volume '{name}' not found in workload")]
    VolumeNotFound { name: String },
    #[error("{kind} '{name}' referenced for rollout was not found")]
    MissingRolloutSource { kind: String, name: String },
    #[error("object '{manifest}' is malformed: {message}")]
    InvalidObject { manifest: String, message: String },
    #[error("no image available for '{name}'")]
    ImageNotResolved { name: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

impl AdaptError {
    /// Shorthand for a malformed object error
    pub fn invalid(manifest: impl Into<String>, message: impl Into<String>) -> Self {
        AdaptError::InvalidObject {
            manifest: manifest.into(),
            message: message.into(),
        }
    }
}
