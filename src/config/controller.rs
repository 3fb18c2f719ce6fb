//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_APPLY_BACKOFF_MAX_MS, DEFAULT_APPLY_BACKOFF_START_MS, DEFAULT_APPLY_MAX_ATTEMPTS,
    DEFAULT_CONTROLLER_NAMESPACE, DEFAULT_IMAGE_REGISTRY, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
    DEFAULT_METRICS_PORT, DEFAULT_PASS_TIMEOUT_SECS, DEFAULT_RECONCILE_INTERVAL_SECS,
    DEFAULT_RELEASE_IMAGES_CONFIGMAP,
};
use crate::controller::apply::RetryPolicy;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace where the controller is deployed
    pub controller_namespace: String,
    /// ConfigMap (in the controller namespace) mapping release image names to pull specs
    pub release_images_configmap: String,
    /// Registry for images missing from the release metadata
    pub default_image_registry: String,
    /// Maximum create-or-update attempts per object before the component is degraded
    pub apply_max_attempts: u32,
    /// Initial delay between apply retries (milliseconds)
    pub apply_backoff_start_ms: u64,
    /// Maximum delay between apply retries (milliseconds)
    pub apply_backoff_max_ms: u64,
    /// Treat `Progressing` dependencies as satisfied
    pub allow_progressing_dependencies: bool,
    /// Requeue interval after a pass where everything is available (seconds)
    pub reconcile_interval_secs: u64,
    /// Deadline for a reconciliation pass (seconds)
    pub pass_timeout_secs: u64,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
    /// Maximum tenant clusters reconciled at the same time
    pub max_concurrent_reconciliations: u16,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            release_images_configmap: DEFAULT_RELEASE_IMAGES_CONFIGMAP.to_string(),
            default_image_registry: DEFAULT_IMAGE_REGISTRY.to_string(),
            apply_max_attempts: DEFAULT_APPLY_MAX_ATTEMPTS,
            apply_backoff_start_ms: DEFAULT_APPLY_BACKOFF_START_MS,
            apply_backoff_max_ms: DEFAULT_APPLY_BACKOFF_MAX_MS,
            allow_progressing_dependencies: false,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            pass_timeout_secs: DEFAULT_PASS_TIMEOUT_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            log_format: "json".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// `from_env` delegates here; tests pass a map-backed closure instead of
    /// mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            controller_namespace: lookup("POD_NAMESPACE").unwrap_or(defaults.controller_namespace),
            release_images_configmap: lookup("RELEASE_IMAGES_CONFIGMAP")
                .unwrap_or(defaults.release_images_configmap),
            default_image_registry: lookup("DEFAULT_IMAGE_REGISTRY")
                .unwrap_or(defaults.default_image_registry),
            apply_max_attempts: parse_or(&lookup, "APPLY_MAX_ATTEMPTS", defaults.apply_max_attempts)
                .max(1),
            apply_backoff_start_ms: parse_or(
                &lookup,
                "APPLY_BACKOFF_START_MS",
                defaults.apply_backoff_start_ms,
            ),
            apply_backoff_max_ms: parse_or(
                &lookup,
                "APPLY_BACKOFF_MAX_MS",
                defaults.apply_backoff_max_ms,
            ),
            allow_progressing_dependencies: bool_or(
                &lookup,
                "ALLOW_PROGRESSING_DEPENDENCIES",
                defaults.allow_progressing_dependencies,
            ),
            reconcile_interval_secs: parse_or(
                &lookup,
                "RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval_secs,
            ),
            pass_timeout_secs: parse_or(&lookup, "PASS_TIMEOUT_SECS", defaults.pass_timeout_secs),
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port),
            max_concurrent_reconciliations: parse_or(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            log_format: lookup("LOG_FORMAT").unwrap_or(defaults.log_format),
        }
    }

    /// Retry policy for object store writes
    #[must_use]
    pub fn apply_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.apply_max_attempts,
            backoff_start: Duration::from_millis(self.apply_backoff_start_ms),
            backoff_max: Duration::from_millis(self.apply_backoff_max_ms),
        }
    }

    /// Get the periodic reconcile interval
    #[must_use]
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// Get the pass deadline
    #[must_use]
    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }
}

/// Read a key and parse it, or return the default value
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a key as boolean or return the default value
fn bool_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = ControllerConfig::from_lookup(|_| None);
        assert_eq!(config.controller_namespace, DEFAULT_CONTROLLER_NAMESPACE);
        assert_eq!(config.apply_max_attempts, DEFAULT_APPLY_MAX_ATTEMPTS);
        assert!(!config.allow_progressing_dependencies);
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("POD_NAMESPACE", "operators"),
            ("APPLY_MAX_ATTEMPTS", "3"),
            ("ALLOW_PROGRESSING_DEPENDENCIES", "Yes"),
            ("PASS_TIMEOUT_SECS", "45"),
        ]));
        assert_eq!(config.controller_namespace, "operators");
        assert_eq!(config.apply_max_attempts, 3);
        assert!(config.allow_progressing_dependencies);
        assert_eq!(config.pass_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("APPLY_MAX_ATTEMPTS", "many"),
            ("METRICS_PORT", "99999"),
        ]));
        assert_eq!(config.apply_max_attempts, DEFAULT_APPLY_MAX_ATTEMPTS);
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
    }

    #[test]
    fn test_zero_attempts_is_clamped_to_one() {
        let config = ControllerConfig::from_lookup(lookup_from(&[("APPLY_MAX_ATTEMPTS", "0")]));
        assert_eq!(config.apply_max_attempts, 1);
    }

    #[test]
    fn test_retry_policy_uses_millisecond_settings() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("APPLY_BACKOFF_START_MS", "10"),
            ("APPLY_BACKOFF_MAX_MS", "50"),
        ]));
        let policy = config.apply_retry_policy();
        assert_eq!(policy.backoff_start, Duration::from_millis(10));
        assert_eq!(policy.backoff_max, Duration::from_millis(50));
    }
}
