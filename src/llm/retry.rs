//! Bounded Retry Policy
//!
//! Wraps a single endpoint call in a fixed number of attempts with a sleep
//! between consecutive failures. Every [`EndpointError`] is retried the same
//! way; there is no fail-fast class.
//!
//! # Strategy
//!
//! - `max_attempts` calls at most, `max_attempts - 1` sleeps at most
//! - The first success ends the loop immediately
//! - Default: 5 attempts, fixed 2 s backoff

use crate::llm::EndpointError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Delay schedule between failed attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay after every failure
    Fixed(Duration),
    /// Delay doubles each attempt: min(base * 2^attempt, max)
    Exponential {
        /// Delay after the first failure
        base: Duration,
        /// Upper bound on any single delay
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (0-indexed)
    pub fn delay(&self, attempt: usize) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, max } => {
                let factor = 2u64.saturating_pow(u32::try_from(attempt).unwrap_or(u32::MAX));
                let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
                let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
                Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: usize,
    /// Delay schedule between failures
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Fixed(Duration::from_secs(2)),
        }
    }
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is clamped to at least one call
    pub fn new(max_attempts: usize, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Fixed-interval policy
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }
}

/// All attempts failed
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted {
    /// Number of calls made
    pub attempts: usize,
    /// Error from the final call
    pub last_error: EndpointError,
}

impl std::fmt::Display for RetryExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Gave up after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl std::error::Error for RetryExhausted {}

/// Execute an async operation under the retry policy
///
/// # Returns
/// * `Ok(T)` - Operation succeeded (possibly after retries)
/// * `Err(RetryExhausted)` - Every attempt failed
///
/// # Example
///
/// ```rust,ignore
/// let completion = call_with_retry(
///     || endpoint.complete(&request),
///     &RetryPolicy::default(),
/// ).await?;
/// ```
pub async fn call_with_retry<F, Fut, T>(
    mut operation: F,
    policy: &RetryPolicy,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EndpointError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempt += 1;
                warn!(attempt, max_attempts, error = %err, "Endpoint call failed");

                if attempt >= max_attempts {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }

                sleep(policy.backoff.delay(attempt - 1)).await;
            }
        }
    }
}
