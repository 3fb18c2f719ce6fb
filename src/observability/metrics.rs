//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `controlplane_reconciliations_total` - Total number of reconciliation passes
//! - `controlplane_reconciliation_errors_total` - Passes that failed outside any component
//! - `controlplane_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `controlplane_component_outcomes_total` - Component outcomes by component and phase
//! - `controlplane_objects_applied_total` - Objects written to the API server by kind
//! - `controlplane_apply_conflicts_total` - Write conflicts hit while applying objects
//! - `controlplane_rollouts_triggered_total` - Rollouts caused by configuration changes

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "controlplane_reconciliations_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "controlplane_reconciliation_errors_total",
        "Total number of reconciliation passes that failed",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "controlplane_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static COMPONENT_OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "controlplane_component_outcomes_total",
            "Component reconciliation outcomes by component and phase",
        ),
        &["component", "phase"],
    )
    .expect("Failed to create COMPONENT_OUTCOMES_TOTAL metric - this should never happen")
});

static OBJECTS_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "controlplane_objects_applied_total",
            "Objects written to the API server by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create OBJECTS_APPLIED_TOTAL metric - this should never happen")
});

static APPLY_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "controlplane_apply_conflicts_total",
        "Write conflicts hit while applying objects",
    )
    .expect("Failed to create APPLY_CONFLICTS_TOTAL metric - this should never happen")
});

static ROLLOUTS_TRIGGERED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "controlplane_rollouts_triggered_total",
            "Workload rollouts caused by a Secret or ConfigMap change",
        ),
        &["component"],
    )
    .expect("Failed to create ROLLOUTS_TRIGGERED_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(COMPONENT_OUTCOMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OBJECTS_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(APPLY_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ROLLOUTS_TRIGGERED_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

/// Count one component outcome
pub fn increment_component_outcome(component: &str, phase: &str) {
    COMPONENT_OUTCOMES_TOTAL
        .with_label_values(&[component, phase])
        .inc();
}

pub fn increment_objects_applied(kind: &str) {
    OBJECTS_APPLIED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_apply_conflicts() {
    APPLY_CONFLICTS_TOTAL.inc();
}

pub fn increment_rollouts_triggered(component: &str) {
    ROLLOUTS_TRIGGERED_TOTAL
        .with_label_values(&[component])
        .inc();
}
