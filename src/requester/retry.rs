//! Bounded retry with backoff
//!
//! One policy is applied to every request a requester issues: transient
//! failures (timeouts, transport errors) are retried up to `max_attempts`
//! total attempts with a growing delay between them; structural failures
//! return immediately.

use std::future::Future;
use std::time::Duration;

use crate::config::TransferConfig;
use crate::error::TransferError;

/// Backoff strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential increase: delay * 2^retry
    Exponential,
}

impl BackoffStrategy {
    /// Calculate delay before retry number `retry` (0 = first retry)
    pub fn calculate_delay(&self, retry: u32, base_delay: Duration, max_delay: Duration) -> Duration {
        let delay = match self {
            BackoffStrategy::Fixed => base_delay,
            BackoffStrategy::Exponential => base_delay.saturating_mul(2u32.saturating_pow(retry)),
        };
        delay.min(max_delay)
    }
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// A non-transient error; not retried
    Fatal(TransferError),
    /// Every attempt failed transiently
    Exhausted {
        attempts: u32,
        last_error: TransferError,
    },
}

impl RetryError {
    pub fn into_error(self) -> TransferError {
        match self {
            RetryError::Fatal(e) => e,
            RetryError::Exhausted { last_error, .. } => last_error,
        }
    }
}

/// Retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(RetryError::Fatal(e)),
                Err(e) if attempt >= max_attempts => {
                    tracing::warn!(
                        request = label,
                        attempts = attempt,
                        error = %e,
                        "Retry budget exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay =
                        self.strategy
                            .calculate_delay(attempt - 1, self.base_delay, self.max_delay);
                    tracing::warn!(
                        request = label,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}
