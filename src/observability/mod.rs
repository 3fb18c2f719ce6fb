//! # Observability
//!
//! - `metrics`: Prometheus metrics collection
//! - `logging`: tracing subscriber setup shared by the binaries

pub mod logging;
pub mod metrics;

pub use metrics::*;
