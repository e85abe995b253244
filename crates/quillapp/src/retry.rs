//! Bounded retry with linear backoff for flaky storage.
//!
//! Delay before attempt `n + 1` is `base_delay * n`. Errors for which
//! [`crate::error::QuillError::is_recoverable`] is false are returned immediately.

use crate::error::Result;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Same attempt budget, no sleeping. Used by tests.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

pub fn with_retry<T, F>(policy: RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_recoverable() => {
                tracing::error!(operation = label, code = err.code(), "fatal storage error, not retrying");
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                tracing::warn!(operation = label, attempts = attempt, "giving up after retries");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after error: {}",
                    err
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}
