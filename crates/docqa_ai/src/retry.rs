use std::thread;
use std::time::Duration;

use docqa_core::config::RetryConfig;
use docqa_core::error::AppError;

/// Bounded retry for calls to external models.
///
/// Attempt `n` (1-based) that fails with a retryable error waits
/// `initial_delay * 2^(n-1)`, capped at `max_delay`, before attempt `n + 1`.
/// Non-retryable errors and the last attempt's error are returned as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
        }
    }

    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    pub fn run<T>(
        &self,
        operation: &str,
        mut call: impl FnMut() -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call() {
                Ok(v) => return Ok(v),
                Err(e) if e.retryable && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        err = %e,
                        "transient failure; retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    if e.retryable {
                        tracing::warn!(operation, attempts = attempt, err = %e, "retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
