//! # Controller
//!
//! Reconciliation machinery for hosted control plane components.
//!
//! - `apply`: create-or-update with bounded retry and cancellation
//! - `backoff`: Fibonacci backoff for retries and error requeues
//! - `dependency`: reconciliation order and per-pass dependency checks
//! - `diff`: desired-vs-live comparison used to skip no-op writes
//! - `fingerprint`: rollout fingerprints over Secret and ConfigMap content
//! - `memory`: in-memory object store for tests and offline rendering
//! - `orchestrator`: one reconciliation pass over every component
//! - `reconciler`: `HostedControlPlane` reconcile entry point and status updates
//! - `registry`: validated component set with cached order
//! - `store`: object store abstraction and its Kubernetes implementation

pub mod apply;
pub mod backoff;
pub mod dependency;
pub mod diff;
pub mod fingerprint;
pub mod memory;
pub mod orchestrator;
pub mod reconciler;
pub mod registry;
pub mod store;
