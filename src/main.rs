//! # Control Plane Operator
//!
//! Kubernetes controller that reconciles the control plane components of every
//! `HostedControlPlane` in the management cluster.
//!
//! ## Overview
//!
//! For each tenant the operator:
//!
//! 1. **Resolves order** - components are reconciled after the components they depend on
//! 2. **Evaluates predicates** - components that do not apply to the tenant are left untouched
//! 3. **Adapts templates** - embedded workload and manifest templates are rendered for the tenant
//! 4. **Tracks rollouts** - Secret/ConfigMap content is fingerprinted onto the pod template
//! 5. **Applies changes** - only objects that differ from the live state are written
//!
//! Configuration comes from environment variables, see `ControllerConfig`.

use anyhow::Result;
use tracing::info;

use controlplane_operator::config::ControllerConfig;
use controlplane_operator::observability::logging::init_logging;
use controlplane_operator::runtime;

#[tokio::main]
async fn main() -> Result<()> {
    // Required by rustls 0.23 when more than one provider could be linked
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = ControllerConfig::from_env();
    init_logging(&config.log_format, "controlplane_operator=info");

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("BUILD_GIT_HASH"),
        built = env!("BUILD_DATETIME"),
        "Starting control plane operator"
    );

    runtime::run(config).await
}
