//! # Reconciliation Orchestrator
//!
//! One pass reconciles every registered component for a single tenant, one
//! component at a time, in the registry's dependency order:
//!
//! ```text
//! Pending ─┬─> PredicateSkipped
//!          ├─> BlockedOnDependency
//!          └─> Adapting ─> Applying ─┬─> Available
//!                    │               ├─> Progressing
//!                    └───────────────┴─> Degraded
//! ```
//!
//! Failures are isolated: a degraded component is recorded and the pass moves
//! on; only its dependents are blocked. Writes happen only when the live
//! object differs from the rendered one, so repeated passes converge without
//! churn.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::core::DynamicObject;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::component::{AdaptError, Component, RolloutState, Workload, WorkloadContext};
use crate::controller::apply::{apply_with_retry, get_with_cancel, ComponentError, RetryPolicy};
use crate::controller::dependency::{check_dependencies, Readiness};
use crate::controller::diff::{changed_paths, is_subset};
use crate::controller::fingerprint::RolloutSources;
use crate::controller::registry::ComponentRegistry;
use crate::controller::store::{ObjectKey, ObjectStore};
use crate::crd::{ComponentPhase, ComponentStatus};
use crate::observability::metrics;

/// Orchestrator tuning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub retry: RetryPolicy,
    /// Let dependents proceed while a dependency is still `Progressing`
    pub allow_progressing_dependencies: bool,
}

/// Result of one pass over all components
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// One record per component, in reconciliation order
    pub statuses: Vec<ComponentStatus>,
    /// The pass was cancelled before every component was reconciled
    pub cancelled: bool,
}

impl PassReport {
    #[must_use]
    pub fn status(&self, name: &str) -> Option<&ComponentStatus> {
        self.statuses.iter().find(|s| s.name == name)
    }

    /// Phase of a component in this pass
    #[must_use]
    pub fn phase(&self, name: &str) -> Option<ComponentPhase> {
        self.status(name).map(|s| s.phase)
    }

    /// Every component that was not skipped by its predicate is available
    #[must_use]
    pub fn all_available(&self) -> bool {
        !self.cancelled
            && self.statuses.iter().all(|s| {
                matches!(
                    s.phase,
                    ComponentPhase::Available | ComponentPhase::PredicateSkipped
                )
            })
    }

    /// Some component still needs another pass to settle
    #[must_use]
    pub fn converging(&self) -> bool {
        !self.all_available()
    }
}

/// Per-component outcome before it is turned into a status record
struct Outcome {
    phase: ComponentPhase,
    fingerprint: Option<String>,
    message: Option<String>,
}

impl Outcome {
    fn new(phase: ComponentPhase) -> Self {
        Self {
            phase,
            fingerprint: None,
            message: None,
        }
    }
}

/// Drives reconciliation passes over a registry
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<ComponentRegistry>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>, settings: OrchestratorSettings) -> Self {
        Self { registry, settings }
    }

    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Run one pass for the tenant described by `ctx`
    ///
    /// Never fails as a whole: per-component failures are recorded in the
    /// report. When `cancel` fires the pass stops and the remaining
    /// components are reported as `Pending`.
    pub async fn reconcile(&self, ctx: &WorkloadContext, cancel: &CancellationToken) -> PassReport {
        let previous = ctx.hcp.status.as_ref();
        let generation = ctx.hcp.metadata.generation;
        let mut statuses: BTreeMap<String, ComponentStatus> = BTreeMap::new();
        let mut report = PassReport::default();

        for component in self.registry.ordered() {
            let name = component.name();
            let prior = previous.and_then(|s| s.component(name));

            let outcome = if report.cancelled {
                Outcome {
                    message: Some("reconciliation pass cancelled".to_string()),
                    ..Outcome::new(ComponentPhase::Pending)
                }
            } else {
                let span = info_span!(parent: &ctx.span, "controller.reconcile.component", component = name);
                match self
                    .reconcile_component(ctx, component, &statuses, prior, cancel)
                    .instrument(span)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(ComponentError::Cancelled) => {
                        warn!(parent: &ctx.span, component = name, "Reconciliation pass cancelled");
                        report.cancelled = true;
                        Outcome {
                            message: Some(ComponentError::Cancelled.to_string()),
                            ..Outcome::new(ComponentPhase::Pending)
                        }
                    }
                    Err(e) => {
                        warn!(parent: &ctx.span, component = name, error = %e, "Component degraded");
                        Outcome {
                            message: Some(e.to_string()),
                            ..Outcome::new(ComponentPhase::Degraded)
                        }
                    }
                }
            };

            metrics::increment_component_outcome(name, outcome.phase.as_str());
            let status = record(name, outcome, prior, generation);
            statuses.insert(name.to_string(), status.clone());
            report.statuses.push(status);
        }

        report
    }

    /// Run one pass that is cancelled once `deadline` elapses
    pub async fn reconcile_with_deadline(&self, ctx: &WorkloadContext, deadline: Duration) -> PassReport {
        let cancel = CancellationToken::new();
        let timer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                cancel.cancel();
            })
        };
        let report = self.reconcile(ctx, &cancel).await;
        timer.abort();
        if report.cancelled {
            warn!(parent: &ctx.span, deadline_secs = deadline.as_secs(), "Pass deadline exceeded");
        }
        report
    }

    async fn reconcile_component(
        &self,
        ctx: &WorkloadContext,
        component: &Component,
        statuses: &BTreeMap<String, ComponentStatus>,
        prior: Option<&ComponentStatus>,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ComponentError> {
        if cancel.is_cancelled() {
            return Err(ComponentError::Cancelled);
        }

        if !component.should_reconcile(ctx).map_err(ComponentError::Predicate)? {
            debug!("Predicate is false, leaving objects untouched");
            return Ok(Outcome::new(ComponentPhase::PredicateSkipped));
        }

        let readiness = check_dependencies(component, statuses, self.settings.allow_progressing_dependencies);
        if let Readiness::Blocked(_) = &readiness {
            let message = readiness.message();
            info!(reason = message.as_deref().unwrap_or_default(), "Blocked on dependencies");
            return Ok(Outcome {
                message,
                ..Outcome::new(ComponentPhase::BlockedOnDependency)
            });
        }

        // Adapting
        let store = ctx.store.as_ref();
        let manifests = component.render_manifests(ctx)?;
        let sources = collect_rollout_sources(store, ctx.namespace(), component, cancel).await?;
        let fingerprint = (!sources.is_empty()).then(|| sources.fingerprint());
        let workload = component.render_workload(ctx, fingerprint.as_deref())?;

        // Applying
        for (_, object) in &manifests {
            self.apply_if_changed(store, object, cancel).await?;
        }
        let workload_object = workload.to_dynamic().map_err(AdaptError::from)?;
        self.apply_if_changed(store, &workload_object, cancel).await?;

        if let Some(fingerprint) = &fingerprint {
            let last = prior.and_then(|p| p.last_applied_fingerprint.as_deref());
            if last.is_some_and(|last| last != fingerprint) {
                info!(fingerprint = %fingerprint, previous = last.unwrap_or_default(), "Configuration changed, rolling out");
                metrics::increment_rollouts_triggered(component.name());
            }
        }

        let phase = match workload_health(store, &workload, &workload_object, cancel).await? {
            RolloutState::Complete => ComponentPhase::Available,
            RolloutState::InProgress => ComponentPhase::Progressing,
        };
        Ok(Outcome {
            phase,
            fingerprint,
            message: None,
        })
    }

    /// Write `object` unless the live object already matches it
    async fn apply_if_changed(
        &self,
        store: &dyn ObjectStore,
        object: &DynamicObject,
        cancel: &CancellationToken,
    ) -> Result<bool, ComponentError> {
        let key = ObjectKey::from_object(object).map_err(|e| AdaptError::Other(e.to_string()))?;
        let desired = serde_json::to_value(object).map_err(AdaptError::from)?;

        if let Some(current) = get_with_cancel(store, &key, cancel).await? {
            let current = serde_json::to_value(&current).map_err(AdaptError::from)?;
            if is_subset(&desired, &current) {
                debug!(object = %key, "Object up to date");
                return Ok(false);
            }
            debug!(object = %key, changed = ?changed_paths(&desired, &current), "Object differs");
        } else {
            debug!(object = %key, "Object does not exist");
        }

        apply_with_retry(store, object, &self.settings.retry, cancel).await?;
        Ok(true)
    }
}

/// Read every registered rollout source
///
/// A missing source fails the component: rolling out without it would hide
/// the configuration the workload is waiting for.
async fn collect_rollout_sources(
    store: &dyn ObjectStore,
    namespace: &str,
    component: &Component,
    cancel: &CancellationToken,
) -> Result<RolloutSources, ComponentError> {
    let mut sources = RolloutSources::new();
    for name in component.rollout_secrets() {
        let secret: Secret = fetch_typed(store, ObjectKey::new("v1", "Secret", namespace, name), cancel).await?;
        sources.add_secret(&secret);
    }
    for name in component.rollout_config_maps() {
        let config_map: ConfigMap =
            fetch_typed(store, ObjectKey::new("v1", "ConfigMap", namespace, name), cancel).await?;
        sources.add_config_map(&config_map);
    }
    Ok(sources)
}

async fn fetch_typed<K: DeserializeOwned>(
    store: &dyn ObjectStore,
    key: ObjectKey,
    cancel: &CancellationToken,
) -> Result<K, ComponentError> {
    let object = get_with_cancel(store, &key, cancel)
        .await?
        .ok_or_else(|| AdaptError::MissingRolloutSource {
            kind: key.kind.clone(),
            name: key.name.clone(),
        })?;
    let value = serde_json::to_value(&object).map_err(AdaptError::from)?;
    Ok(serde_json::from_value(value).map_err(AdaptError::from)?)
}

/// Rollout state of the live workload
async fn workload_health(
    store: &dyn ObjectStore,
    rendered: &Workload,
    object: &DynamicObject,
    cancel: &CancellationToken,
) -> Result<RolloutState, ComponentError> {
    let key = ObjectKey::from_object(object).map_err(|e| AdaptError::Other(e.to_string()))?;
    let Some(live) = get_with_cancel(store, &key, cancel).await? else {
        return Ok(RolloutState::InProgress);
    };
    let live = Workload::from_dynamic(rendered.kind(), &live).map_err(AdaptError::from)?;
    Ok(live.rollout_state())
}

/// Turn an outcome into the component's status record
///
/// The applied fingerprint only moves forward when the workload was applied;
/// the transition time only changes with the phase.
fn record(
    name: &str,
    outcome: Outcome,
    prior: Option<&ComponentStatus>,
    generation: Option<i64>,
) -> ComponentStatus {
    let last_applied_fingerprint = outcome
        .fingerprint
        .or_else(|| prior.and_then(|p| p.last_applied_fingerprint.clone()));
    let last_transition_time = match prior {
        Some(p) if p.phase == outcome.phase => p.last_transition_time.clone(),
        _ => Some(Utc::now().to_rfc3339()),
    };
    ComponentStatus {
        name: name.to_string(),
        phase: outcome.phase,
        condition: outcome.phase.condition(),
        observed_generation: generation,
        last_applied_fingerprint,
        message: outcome.message,
        last_transition_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_fingerprint_when_not_applied() {
        let mut prior = ComponentStatus::new("kube-apiserver");
        prior.phase = ComponentPhase::Available;
        prior.last_applied_fingerprint = Some("abc".to_string());
        prior.last_transition_time = Some("2024-01-01T00:00:00+00:00".to_string());

        let status = record(
            "kube-apiserver",
            Outcome::new(ComponentPhase::BlockedOnDependency),
            Some(&prior),
            Some(3),
        );
        assert_eq!(status.last_applied_fingerprint.as_deref(), Some("abc"));
        assert_ne!(status.last_transition_time, prior.last_transition_time);
        assert_eq!(status.observed_generation, Some(3));
    }

    #[test]
    fn test_record_keeps_transition_time_for_same_phase() {
        let mut prior = ComponentStatus::new("etcd");
        prior.phase = ComponentPhase::Available;
        prior.last_transition_time = Some("2024-01-01T00:00:00+00:00".to_string());

        let status = record(
            "etcd",
            Outcome {
                fingerprint: Some("def".to_string()),
                ..Outcome::new(ComponentPhase::Available)
            },
            Some(&prior),
            None,
        );
        assert_eq!(status.last_transition_time, prior.last_transition_time);
        assert_eq!(status.last_applied_fingerprint.as_deref(), Some("def"));
    }

    #[test]
    fn test_report_convergence() {
        let mut available = ComponentStatus::new("etcd");
        available.phase = ComponentPhase::Available;
        let mut skipped = ComponentStatus::new("karpenter-operator");
        skipped.phase = ComponentPhase::PredicateSkipped;
        let report = PassReport {
            statuses: vec![available, skipped],
            cancelled: false,
        };
        assert!(report.all_available());

        let mut blocked = ComponentStatus::new("kube-apiserver");
        blocked.phase = ComponentPhase::BlockedOnDependency;
        let mut report = report;
        report.statuses.push(blocked);
        assert!(report.converging());
    }
}
