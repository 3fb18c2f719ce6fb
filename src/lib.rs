//! Control Plane Operator Library
//!
//! Reconciles the control plane components of hosted Kubernetes clusters.
//! Each tenant is described by a `HostedControlPlane` in its own namespace of
//! the management cluster; every registered component is rendered for that
//! tenant and applied in dependency order.
//!
//! - `component`: component model, builder, adapters and sidecars
//! - `components`: the concrete component catalog
//! - `controller`: registry, dependency resolution, orchestration and apply
//! - `crd`: `HostedControlPlane` custom resource and status records

pub mod component;
pub mod components;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod server;

pub use component::{Component, ComponentBuilder, WorkloadContext};
pub use controller::orchestrator::{Orchestrator, OrchestratorSettings, PassReport};
pub use controller::registry::ComponentRegistry;
pub use crd::{HostedControlPlane, HostedControlPlaneSpec, HostedControlPlaneStatus};
