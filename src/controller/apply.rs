//! # Apply With Retry
//!
//! Writes a single object through the [`ObjectStore`], retrying conflicts and
//! transient failures with a bounded Fibonacci backoff. The pass's
//! cancellation token is honored both while the write is in flight and while
//! waiting between attempts.

use std::time::Duration;

use kube::core::DynamicObject;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::component::AdaptError;
use crate::constants::{
    DEFAULT_APPLY_BACKOFF_MAX_MS, DEFAULT_APPLY_BACKOFF_START_MS, DEFAULT_APPLY_MAX_ATTEMPTS,
};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::store::{ObjectKey, ObjectStore, StoreError};
use crate::observability::metrics;

/// Bounded retry policy for object store writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub backoff_start: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_APPLY_MAX_ATTEMPTS,
            backoff_start: Duration::from_millis(DEFAULT_APPLY_BACKOFF_START_MS),
            backoff_max: Duration::from_millis(DEFAULT_APPLY_BACKOFF_MAX_MS),
        }
    }
}

/// Why a component ended up `Degraded` (or stopped) in a pass
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("predicate failed: {0}")]
    Predicate(#[source] AdaptError),
    #[error("adapt failed: {0}")]
    Adapt(#[from] AdaptError),
    #[error("applying {key} failed after {attempts} attempts: {source}")]
    ApplyRetriesExhausted {
        key: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error("object store error for {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("reconciliation pass cancelled")]
    Cancelled,
}

impl ComponentError {
    fn store(key: &ObjectKey, source: StoreError) -> Self {
        match source {
            StoreError::Cancelled => ComponentError::Cancelled,
            source => ComponentError::Store {
                key: key.to_string(),
                source,
            },
        }
    }
}

/// Read an object, aborting if the pass is cancelled
pub async fn get_with_cancel(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    cancel: &CancellationToken,
) -> Result<Option<DynamicObject>, ComponentError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ComponentError::Cancelled),
        result = store.get(key) => result.map_err(|e| ComponentError::store(key, e)),
    }
}

/// Create or update `object`, retrying retryable failures
///
/// Returns the number of attempts the write took.
///
/// # Errors
///
/// - [`ComponentError::ApplyRetriesExhausted`] when every attempt hit a
///   conflict or transient failure
/// - [`ComponentError::Store`] on a non-retryable failure
/// - [`ComponentError::Cancelled`] when `cancel` fires
pub async fn apply_with_retry(
    store: &dyn ObjectStore,
    object: &DynamicObject,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<u32, ComponentError> {
    let key = ObjectKey::from_object(object).map_err(|e| ComponentError::Store {
        key: object.metadata.name.clone().unwrap_or_default(),
        source: e,
    })?;
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = FibonacciBackoff::new(policy.backoff_start, policy.backoff_max);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ComponentError::Cancelled),
            result = store.create_or_update(object) => result,
        };

        let error = match result {
            Ok(()) => {
                debug!(object = %key, attempt, "Applied object");
                metrics::increment_objects_applied(&key.kind);
                return Ok(attempt);
            }
            Err(e) if e.is_retryable() => e,
            Err(e) => return Err(ComponentError::store(&key, e)),
        };

        if matches!(error, StoreError::Conflict(_)) {
            metrics::increment_apply_conflicts();
        }
        if attempt >= max_attempts {
            return Err(ComponentError::ApplyRetriesExhausted {
                key: key.to_string(),
                attempts: attempt,
                source: error,
            });
        }

        let delay = backoff.next_backoff();
        warn!(
            object = %key,
            attempt,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Retrying apply"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ComponentError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
