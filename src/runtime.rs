//! # Runtime
//!
//! Wires the operator together: metrics, the probe server, the component
//! registry and the `HostedControlPlane` watch loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use kube::{Api, Client};
use kube_runtime::{watcher, Controller};
use tracing::{debug, error, info, warn};

use crate::components::default_registry;
use crate::config::ControllerConfig;
use crate::controller::reconciler::{error_policy, reconcile, Reconciler};
use crate::crd::HostedControlPlane;
use crate::observability::metrics;
use crate::server::{start_server, ServerState};

/// Run the operator until a shutdown signal arrives
///
/// # Errors
///
/// Fails when metrics cannot be registered, the component registry is
/// invalid or no Kubernetes client can be built.
pub async fn run(config: ControllerConfig) -> Result<()> {
    metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });
    let server_port = config.metrics_port;
    let state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, state).await {
            error!("HTTP server error: {}", e);
        }
    });

    // A bad registration is a programming error; refuse to start
    let registry = Arc::new(default_registry().context("Invalid component registry")?);
    info!(order = ?registry.order(), "Component registry validated");

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let concurrency = config.max_concurrent_reconciliations;
    let reconciler = Arc::new(Reconciler::new(client.clone(), config, registry));

    let hcps: Api<HostedControlPlane> = Api::all(client);
    server_state.is_ready.store(true, Ordering::Relaxed);
    info!(concurrency, "Watching HostedControlPlane resources");

    Controller::new(hcps, watcher::Config::default().any_semantic())
        .with_config(kube_runtime::controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|result| {
            match result {
                Ok((object, _)) => debug!(resource = %object.name, "Reconciled"),
                Err(e) => warn!(error = %e, "Controller error"),
            }
            std::future::ready(())
        })
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller stopped");
    Ok(())
}
