//! Explicit retry policy for network operations.
//!
//! Every download carries a [`RetryPolicy`] value rather than relying on an
//! ambient wrapper, so the retry semantics of each operation are visible at
//! the call site and controllable in tests.

use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;

use crate::config::{
    RETRY_FACTOR, RETRY_INITIAL_DELAY_MS, RETRY_MAX_ATTEMPTS, RETRY_MAX_DELAY_SECS,
};

/// Classification hook deciding whether a failed attempt is worth repeating.
pub trait Retryable {
    /// Whether another attempt may succeed.
    fn is_retriable(&self) -> bool;
}

/// An exponential backoff policy with a bounded number of attempts.
///
/// `max_attempts` counts the initial attempt, so a policy with
/// `max_attempts = 3` sleeps at most twice.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Multiplier applied on top of the exponential growth.
    pub factor: u64,
    /// Upper bound for any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            initial_delay_ms: RETRY_INITIAL_DELAY_MS,
            factor: RETRY_FACTOR,
            max_delay: Duration::from_secs(RETRY_MAX_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries; useful in tests and for permanent-only
    /// operations.
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Builds the backoff iterator for one protected operation.
    ///
    /// The iterator yields one delay per *retry*, so it is `take`n to
    /// `max_attempts - 1` entries.
    pub fn strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.initial_delay_ms)
            .factor(self.factor)
            .max_delay(self.max_delay)
            .take(self.max_attempts.saturating_sub(1))
    }

    /// Runs `action` under this policy, retrying only failures the error type
    /// itself classifies as retriable.
    ///
    /// # Arguments
    ///
    /// * `operation` - Short label used in retry log lines
    /// * `action` - The fallible operation; called once per attempt
    pub async fn run<T, E, A, F>(&self, operation: &str, action: A) -> Result<T, E>
    where
        A: FnMut() -> F,
        F: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        RetryIf::spawn(self.strategy(), action, |err: &E| {
            let retriable = err.is_retriable();
            if retriable {
                log::warn!("Retriable failure in {}: {}", operation, err);
            }
            retriable
        })
        .await
    }
}
