//! # CPOCTL CLI
//!
//! Offline tooling for the control plane operator.
//!
//! ## Usage
//!
//! ```bash
//! # Print the reconciliation order of the component catalog
//! cpoctl order
//!
//! # Render every component for a HostedControlPlane without a cluster
//! cpoctl render --file hcp.yaml --release-images release-images.yaml --objects secrets.yaml
//! ```
//!
//! `render` runs one reconciliation pass against an in-memory object store
//! whose workloads report ready immediately, prints the resulting objects as
//! YAML on stdout and the per-component outcome on stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::core::DynamicObject;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use controlplane_operator::component::{ReleaseImages, WorkloadContext};
use controlplane_operator::components::default_registry;
use controlplane_operator::constants::DEFAULT_IMAGE_REGISTRY;
use controlplane_operator::controller::store::{MemoryObjectStore, ObjectStore};
use controlplane_operator::observability::logging::init_logging;
use controlplane_operator::{HostedControlPlane, Orchestrator, OrchestratorSettings};

/// Control plane operator CLI
#[derive(Parser)]
#[command(name = "cpoctl", about = "Control plane operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the component reconciliation order
    Order,
    /// Render one reconciliation pass for a HostedControlPlane
    Render {
        /// HostedControlPlane manifest
        #[arg(short, long)]
        file: PathBuf,
        /// ConfigMap with release image pull specs (and `version`)
        #[arg(short, long)]
        release_images: Option<PathBuf>,
        /// Existing objects (Secrets, ConfigMaps, ...) to seed the store with
        #[arg(short, long)]
        objects: Option<PathBuf>,
        /// Let dependents proceed while dependencies are progressing
        #[arg(long)]
        allow_progressing: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("text", "cpoctl=info,controlplane_operator=warn");
    let cli = Cli::parse();

    match cli.command {
        Commands::Order => print_order(),
        Commands::Render {
            file,
            release_images,
            objects,
            allow_progressing,
        } => render(&file, release_images.as_deref(), objects.as_deref(), allow_progressing).await,
    }
}

fn print_order() -> Result<()> {
    let registry = default_registry().context("Invalid component registry")?;
    for (i, component) in registry.ordered().enumerate() {
        if component.dependencies().is_empty() {
            println!("{:>2}. {}", i + 1, component.name());
        } else {
            println!(
                "{:>2}. {} (after {})",
                i + 1,
                component.name(),
                component.dependencies().join(", ")
            );
        }
    }
    Ok(())
}

async fn render(
    file: &Path,
    release_images: Option<&Path>,
    objects: Option<&Path>,
    allow_progressing: bool,
) -> Result<()> {
    let hcp: HostedControlPlane = serde_yaml::from_str(&read(file)?)
        .with_context(|| format!("Failed to parse HostedControlPlane from {}", file.display()))?;

    let release = match release_images {
        Some(path) => {
            let config_map: ConfigMap = serde_yaml::from_str(&read(path)?)
                .with_context(|| format!("Failed to parse ConfigMap from {}", path.display()))?;
            ReleaseImages::from_config_map(&config_map, DEFAULT_IMAGE_REGISTRY)
        }
        None => ReleaseImages::new(
            release_version(&hcp.spec.release_image),
            Default::default(),
            DEFAULT_IMAGE_REGISTRY,
        ),
    };

    let store = Arc::new(MemoryObjectStore::new().with_ready_workloads());
    if let Some(path) = objects {
        for object in parse_objects(&read(path)?)
            .with_context(|| format!("Failed to parse objects from {}", path.display()))?
        {
            store.insert(object).context("Failed to seed object store")?;
        }
    }
    let seeded = store.objects().len();

    let registry = Arc::new(default_registry().context("Invalid component registry")?);
    let orchestrator = Orchestrator::new(
        registry,
        OrchestratorSettings {
            allow_progressing_dependencies: allow_progressing,
            ..OrchestratorSettings::default()
        },
    );
    let backend: Arc<dyn ObjectStore> = Arc::clone(&store) as Arc<dyn ObjectStore>;
    let ctx = WorkloadContext::new(Arc::new(hcp), Arc::new(release), backend);
    let report = orchestrator.reconcile(&ctx, &CancellationToken::new()).await;

    for key in store.writes() {
        if let Some(object) = store.object(&key) {
            println!("---");
            print!("{}", serde_yaml::to_string(&object)?);
        }
    }

    eprintln!("seeded {seeded} objects, wrote {}", store.write_count());
    for status in &report.statuses {
        match &status.message {
            Some(message) => eprintln!("{:<20} {:<20} {message}", status.name, status.phase),
            None => eprintln!("{:<20} {}", status.name, status.phase),
        }
    }
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Every document of a multi-document YAML stream
fn parse_objects(yaml: &str) -> Result<Vec<DynamicObject>, serde_yaml::Error> {
    serde_yaml::Deserializer::from_str(yaml)
        .map(DynamicObject::deserialize)
        .collect()
}

/// Tag of a release image reference, e.g. `4.17.0-x86_64`
fn release_version(release_image: &str) -> String {
    let name = release_image.rsplit('/').next().unwrap_or(release_image);
    name.split_once(':')
        .map(|(_, tag)| tag.to_string())
        .unwrap_or_default()
}
