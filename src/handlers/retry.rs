//! Whole-operation retry on storage contention

use std::future::Future;
use std::time::Duration;

use crate::error::LedgerResult;

/// Bounded retry with linear backoff (`backoff * attempt`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable
    /// error, or runs out of attempts. Each call must start a fresh unit
    /// of work.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f().await {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        operation,
                        error = %e,
                        "Storage conflict, retrying (attempt {}/{})",
                        attempt,
                        max_attempts
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                result => return result,
            }
        }
    }
}
