//! Exponential backoff for rate-limited remote calls.
//!
//! Only rate-limit failures are retried. A failure counts as rate limited
//! when its description carries an HTTP 429 or a resource-exhaustion
//! marker; anything else propagates on first occurrence.
//!
//! Backoff: `base_delay * 2^attempt`, i.e. 5s, 10s, 20s with the defaults.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;

const RATE_LIMIT_MARKERS: [&str; 3] = ["429", "ResourceExhausted", "RESOURCE_EXHAUSTED"];

/// Whether an error description looks like a rate-limit rejection.
pub fn is_rate_limited(description: &str) -> bool {
    RATE_LIMIT_MARKERS.iter().any(|m| description.contains(m))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.base_delay())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt + 1` (attempt counted from 0).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }

    /// Run `f` until it succeeds, fails with a non-rate-limit error, or the
    /// retries are used up. Returns the last error in the latter two cases.
    pub async fn run<F, Fut, T, E>(&self, operation: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(
                            operation,
                            attempts = attempt + 1,
                            "remote call succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let description = e.to_string();
                    if !is_rate_limited(&description) {
                        return Err(e);
                    }
                    if attempt >= self.max_retries {
                        tracing::warn!(
                            operation,
                            attempts = attempt + 1,
                            error = %description,
                            "rate limited, retries exhausted"
                        );
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        backoff_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
