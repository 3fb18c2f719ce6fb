//! # Reconciler
//!
//! `HostedControlPlane` reconcile entry point.
//!
//! ## Reconciliation Flow
//!
//! 1. Load release image metadata from the controller namespace
//! 2. Build the tenant's [`WorkloadContext`]
//! 3. Run one orchestrator pass under the pass deadline
//! 4. Write per-component status and the `ComponentsAvailable` condition
//! 5. Requeue: soon while components converge, otherwise on the periodic interval

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use kube_runtime::controller::Action;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::component::{ReleaseImages, WorkloadContext};
use crate::config::ControllerConfig;
use crate::constants::{
    DEFAULT_CONVERGING_REQUEUE_SECS, ERROR_BACKOFF_MAX_MINUTES, ERROR_BACKOFF_MIN_MINUTES,
    FIELD_MANAGER,
};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::orchestrator::{Orchestrator, OrchestratorSettings, PassReport};
use crate::controller::registry::ComponentRegistry;
use crate::controller::store::{KubeObjectStore, ObjectKey, ObjectStore, StoreError};
use crate::crd::{ComponentPhase, Condition, HostedControlPlane, HostedControlPlaneStatus};
use crate::observability::metrics;

/// Condition type summarizing component health on the HostedControlPlane
pub const COMPONENTS_AVAILABLE_CONDITION: &str = "ComponentsAvailable";

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("release image metadata unavailable: {0}")]
    ReleaseImages(String),
    #[error("object store error: {0}")]
    Store(#[from] StoreError),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-resource error backoff
///
/// Keyed by `namespace/name`; reset after a successful reconcile.
#[derive(Debug, Default)]
pub struct ErrorBackoffs {
    states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl ErrorBackoffs {
    /// Next requeue delay after a failed reconcile of `key`
    pub fn next(&self, key: &str) -> Duration {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states
            .entry(key.to_string())
            .or_insert_with(|| {
                FibonacciBackoff::from_minutes(ERROR_BACKOFF_MIN_MINUTES, ERROR_BACKOFF_MAX_MINUTES)
            })
            .next_backoff()
    }

    pub fn reset(&self, key: &str) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.remove(key);
    }
}

/// Shared reconciler context handed to every reconcile call
pub struct Reconciler {
    pub client: Client,
    pub config: ControllerConfig,
    pub orchestrator: Orchestrator,
    pub store: Arc<dyn ObjectStore>,
    pub backoffs: ErrorBackoffs,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(client: Client, config: ControllerConfig, registry: Arc<ComponentRegistry>) -> Self {
        let settings = OrchestratorSettings {
            retry: config.apply_retry_policy(),
            allow_progressing_dependencies: config.allow_progressing_dependencies,
        };
        Self {
            store: Arc::new(KubeObjectStore::new(client.clone())),
            orchestrator: Orchestrator::new(registry, settings),
            client,
            config,
            backoffs: ErrorBackoffs::default(),
        }
    }

    async fn patch_status(
        &self,
        hcp: &HostedControlPlane,
        status: &HostedControlPlaneStatus,
    ) -> Result<(), ReconcilerError> {
        let api: Api<HostedControlPlane> = Api::namespaced(self.client.clone(), hcp.tenant_namespace());
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            hcp.metadata.name.as_deref().unwrap_or("unknown"),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(patch),
        )
        .await?;
        Ok(())
    }
}

/// `namespace/name` of a HostedControlPlane, used as the backoff key
#[must_use]
pub fn resource_key(hcp: &HostedControlPlane) -> String {
    format!(
        "{}/{}",
        hcp.tenant_namespace(),
        hcp.metadata.name.as_deref().unwrap_or("unknown")
    )
}

/// Reconcile one HostedControlPlane
///
/// # Errors
///
/// Only failures outside any component are returned (missing release
/// metadata, status write). Component failures end up in status.
pub async fn reconcile(
    hcp: Arc<HostedControlPlane>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    metrics::increment_reconciliations();

    let release = load_release_images(
        ctx.store.as_ref(),
        &ctx.config.controller_namespace,
        &ctx.config.release_images_configmap,
        &ctx.config.default_image_registry,
    )
    .await?;

    let workload_ctx = WorkloadContext::new(Arc::clone(&hcp), Arc::new(release), Arc::clone(&ctx.store));
    info!(parent: &workload_ctx.span, release = %workload_ctx.release.version, "Reconciling HostedControlPlane");

    let report = ctx
        .orchestrator
        .reconcile_with_deadline(&workload_ctx, ctx.config.pass_timeout())
        .await;

    let status = build_status(&hcp, &report);
    if hcp.status.as_ref().is_some_and(|current| same_status(current, &status)) {
        debug!(parent: &workload_ctx.span, "Status unchanged, skipping update");
    } else {
        ctx.patch_status(&hcp, &status).await?;
    }

    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    ctx.backoffs.reset(&resource_key(&hcp));

    let requeue = requeue_after(&report, ctx.config.reconcile_interval());
    info!(
        parent: &workload_ctx.span,
        available = report.all_available(),
        cancelled = report.cancelled,
        requeue_secs = requeue.as_secs(),
        "Reconciliation pass finished"
    );
    Ok(Action::requeue(requeue))
}

/// Read release image metadata through the object store
///
/// # Errors
///
/// [`ReconcilerError::ReleaseImages`] when the ConfigMap does not exist.
pub async fn load_release_images(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
    default_registry: &str,
) -> Result<ReleaseImages, ReconcilerError> {
    let key = ObjectKey::new("v1", "ConfigMap", namespace, name);
    let object = store
        .get(&key)
        .await?
        .ok_or_else(|| ReconcilerError::ReleaseImages(format!("{key} not found")))?;
    let config_map: ConfigMap = serde_json::from_value(serde_json::to_value(&object)?)?;
    Ok(ReleaseImages::from_config_map(&config_map, default_registry))
}

/// Requeue quickly while anything is still converging
#[must_use]
pub fn requeue_after(report: &PassReport, interval: Duration) -> Duration {
    if report.converging() {
        interval.min(Duration::from_secs(DEFAULT_CONVERGING_REQUEUE_SECS))
    } else {
        interval
    }
}

/// Status to write after a pass
#[must_use]
pub fn build_status(hcp: &HostedControlPlane, report: &PassReport) -> HostedControlPlaneStatus {
    let previous = hcp.status.as_ref();
    let (status, reason, message) = if report.all_available() {
        ("True", "AllComponentsAvailable", None)
    } else if report.cancelled {
        ("False", "PassCancelled", Some("reconciliation pass did not finish".to_string()))
    } else {
        let waiting: Vec<String> = report
            .statuses
            .iter()
            .filter(|s| !matches!(s.phase, ComponentPhase::Available | ComponentPhase::PredicateSkipped))
            .map(|s| format!("{} is {}", s.name, s.phase))
            .collect();
        ("False", "ComponentsNotAvailable", Some(waiting.join(", ")))
    };

    let last_transition_time = previous
        .and_then(|p| {
            p.conditions
                .iter()
                .find(|c| c.r#type == COMPONENTS_AVAILABLE_CONDITION && c.status == status)
        })
        .and_then(|c| c.last_transition_time.clone())
        .or_else(|| Some(chrono::Utc::now().to_rfc3339()));

    let mut conditions: Vec<Condition> = previous
        .map(|p| {
            p.conditions
                .iter()
                .filter(|c| c.r#type != COMPONENTS_AVAILABLE_CONDITION)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    conditions.push(Condition {
        r#type: COMPONENTS_AVAILABLE_CONDITION.to_string(),
        status: status.to_string(),
        last_transition_time,
        reason: Some(reason.to_string()),
        message,
    });

    HostedControlPlaneStatus {
        conditions,
        components: report.statuses.clone(),
        observed_generation: hcp.metadata.generation,
        last_reconcile_time: Some(chrono::Utc::now().to_rfc3339()),
    }
}

/// Equal apart from the reconcile timestamp
fn same_status(current: &HostedControlPlaneStatus, desired: &HostedControlPlaneStatus) -> bool {
    current.components == desired.components
        && current.conditions == desired.conditions
        && current.observed_generation == desired.observed_generation
}

/// Requeue policy after a failed reconcile
pub fn error_policy(hcp: Arc<HostedControlPlane>, error: &ReconcilerError, ctx: Arc<Reconciler>) -> Action {
    metrics::increment_reconciliation_errors();
    let key = resource_key(&hcp);
    let delay = ctx.backoffs.next(&key);
    warn!(resource = %key, error = %error, retry_secs = delay.as_secs(), "Reconciliation failed");
    Action::requeue(delay)
}
