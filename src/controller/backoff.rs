//! # Fibonacci Backoff
//!
//! Provides a Fibonacci-based backoff mechanism for retries.
//! This grows more slowly than exponential backoff, which suits both short
//! apply retries against the API server (milliseconds) and per-resource
//! reconciliation error requeues (minutes).
//!
//! ## Usage
//!
//! ```rust
//! use controlplane_operator::controller::backoff::FibonacciBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = FibonacciBackoff::from_minutes(1, 10);
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(120));
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous backoff value
    prev: Duration,
    /// Current backoff value
    current: Duration,
    /// Maximum backoff value
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with the given minimum and maximum
    ///
    /// A `max` below `min` is raised to `min`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            prev: Duration::ZERO,
            current: min,
            max: max.max(min),
        }
    }

    /// Create a backoff expressed in whole minutes
    ///
    /// Default sequence for reconciliation errors: 1m, 1m, 2m, 3m, 5m, 8m, 10m (max)
    #[must_use]
    pub fn from_minutes(min_minutes: u64, max_minutes: u64) -> Self {
        Self::new(
            Duration::from_secs(min_minutes * 60),
            Duration::from_secs(max_minutes * 60),
        )
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);
        result
    }
}
