//! # Configuration
//!
//! Controller-level settings. Values come from environment variables that are
//! populated from a ConfigMap via `envFrom` in the operator deployment.

mod controller;

pub use controller::ControllerConfig;
