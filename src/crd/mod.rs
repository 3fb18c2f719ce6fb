//! # Custom Resource Definitions
//!
//! CRD types consumed by the control plane operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `HostedControlPlane` specification (platform, identity, availability policy)
//! - `autoscaling.rs` - Cluster autoscaler configuration
//! - `status.rs` - Status types, including per-component status records

mod autoscaling;
mod spec;
mod status;

pub use autoscaling::{ClusterAutoscaling, ExpanderString, ScaleDownConfig, ScalingType};
pub use spec::{
    AutoNode, AvailabilityPolicy, HostedControlPlane, HostedControlPlaneSpec, PlatformSpec,
    PlatformType,
};
pub use status::{
    ComponentCondition, ComponentPhase, ComponentStatus, Condition, HostedControlPlaneStatus,
};
