//! Bounded retry for configuration refreshes
//!
//! Refreshes run inside the cache's background sweep, so retries happen
//! back to back with no delay: a failed refresh costs at most
//! `max_retries + 1` fetches per tick and the entry keeps serving its
//! previous value until its TTL runs out.

use std::future::Future;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Retry policy with a fixed attempt budget and no backoff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    /// `max_retries` counts retries after the first attempt
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// Returns the first success, or the error from the final attempt.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start_time = Instant::now();
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(
                            attempt = %attempt,
                            total_duration_ms = %start_time.elapsed().as_millis(),
                            "Operation succeeded after {} attempts", attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) if attempt >= max_attempts => {
                    warn!(
                        attempts = %attempt,
                        total_duration_ms = %start_time.elapsed().as_millis(),
                        error = %error,
                        "Operation failed after all retry attempts"
                    );
                    return Err(error);
                }
                Err(error) => {
                    debug!(
                        attempt = %attempt,
                        max_attempts = %max_attempts,
                        error = %error,
                        "Operation failed, retrying"
                    );
                }
            }
        }
    }
}
