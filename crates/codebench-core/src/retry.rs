//! Retry control for generation calls: bounded attempts with capped
//! exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::generator::GenerationError;

/// Attempt budget and backoff schedule for one generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per sample, including the first (minimum 1).
    pub max_attempts: u32,
    /// Delay before the second attempt (milliseconds); doubles afterwards.
    pub backoff_base_ms: u64,
    /// Upper bound for the computed backoff (milliseconds).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff to wait after attempt number `attempt` (1-based) failed, or
    /// `None` once the budget is spent.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts.max(1) {
            return None;
        }
        let factor = 1u64 << attempt.saturating_sub(1).min(30);
        let ms = self
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.backoff_max_ms);
        Some(Duration::from_millis(ms))
    }

    /// Like [`delay_after`](Self::delay_after), but a backend rate-limit
    /// hint lengthens the wait, up to `backoff_max_ms`.
    pub fn delay_for(&self, attempt: u32, error: &GenerationError) -> Option<Duration> {
        let backoff = self.delay_after(attempt)?;
        let cap = Duration::from_millis(self.backoff_max_ms);
        Some(match error.retry_after() {
            Some(hint) => backoff.max(hint.min(cap)),
            None => backoff,
        })
    }
}

/// Every attempt failed, or a non-retryable error stopped the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: GenerationError,
}

/// Run `op` until it succeeds or the policy gives up.
///
/// `op` receives the 1-based attempt number. On success returns the value
/// together with the number of attempts used.
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<(T, u32), RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(err) => {
                let delay = if err.is_retryable() {
                    policy.delay_for(attempt, &err)
                } else {
                    None
                };
                match delay {
                    Some(delay) => {
                        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying generation");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last_error: err,
                        })
                    }
                }
            }
        }
    }
}
