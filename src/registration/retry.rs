//! Bounded exponential backoff
//!
//! Only [`ApiError::TransientNetwork`] is retried. Authorization failures
//! and other rejections are returned on the first attempt.

use crate::error::ApiError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Retry policy for individual ARM calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with the default multiplier.
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Retries without sleeping. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_millis = self.initial_delay.as_millis() as f64;
        let delay_millis = base_millis * self.multiplier.powf(attempt as f64);
        let capped = delay_millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// Non-transient error, returned on the attempt it happened.
    Fatal(ApiError),
    /// Still failing transiently after the attempt cap.
    Exhausted { attempts: u32, last_error: ApiError },
    /// The deadline elapsed during the call or a backoff sleep.
    DeadlineElapsed,
    /// The cancellation token fired during the call or a backoff sleep.
    Cancelled,
}

/// Run `operation` until it succeeds, fails fatally, or the policy, the
/// deadline or the cancellation token stop it.
pub async fn retry_call<T, F, Fut>(
    policy: &RetryPolicy,
    deadline: Instant,
    cancel: &CancellationToken,
    what: &str,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => return Err(RetryError::DeadlineElapsed),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!("{} succeeded after {} retries", what, attempt);
                }
                return Ok(value);
            }
            Err(err) if !err.is_transient() => return Err(RetryError::Fatal(err)),
            Err(err) => err,
        };

        attempt += 1;
        if attempt >= attempts {
            tracing::warn!("{} failed after {} attempts: {}", what, attempt, err);
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last_error: err,
            });
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        tracing::warn!(
            "{} attempt {}/{} failed: {} - retrying in {:?}",
            what,
            attempt,
            attempts,
            err,
            delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => return Err(RetryError::DeadlineElapsed),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
