//! Bounded retry with exponential backoff.
//!
//! Used for optimistic-concurrency conflicts on fold records:
//! - Backoff: `initial * 2^n`, capped at `max_backoff`
//! - Attempts: at most `max_attempts` calls in total
//! - Only errors the predicate accepts are retried

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry budget for one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub max_attempts: u32,

    /// Backoff before the first retry
    pub initial_backoff: Duration,

    /// Upper bound on a single backoff
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the given 0-based failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Retry an async operation while `is_retryable` accepts its error.
///
/// The operation receives the 0-based attempt number. Returns the first
/// success, the first non-retryable error, or the last error once
/// `max_attempts` is spent.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !is_retryable(&err) || attempt + 1 >= max_attempts {
                    return Err(err);
                }

                let backoff = policy.backoff(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "retrying after conflict"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
