// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff for durable store operations.
//!
//! Only the durable store retries. Transport calls are never retried here:
//! timeouts and retries for the network belong to the [`crate::Transport`].
//!
//! # Example
//!
//! ```
//! use fetch_engine::RetryConfig;
//!
//! // Connect: a handful of attempts so a bad URL fails startup quickly
//! let connect = RetryConfig::connect();
//! assert_eq!(connect.max_retries, 5);
//!
//! // Write: one quick retry, then report the failure and move on
//! let write = RetryConfig::write();
//! assert_eq!(write.max_retries, 2);
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff schedule for a retried operation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts, including the first
    pub max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::write()
    }
}

impl RetryConfig {
    /// Opening a durable store: 5 attempts, ~3 seconds worst case.
    #[must_use]
    pub fn connect() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Write-through and deletes: a cache write is never worth a long wait.
    #[must_use]
    pub fn write() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Delay before attempt `n + 1`, given the delay before attempt `n`.
    #[must_use]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor).min(self.max_delay)
    }
}

pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, attempts, "Succeeded after retry");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if attempts >= config.max_retries {
                    return Err(err);
                }

                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    max = config.max_retries,
                    error = %err,
                    retry_in = ?delay,
                    "Durable store operation failed, retrying"
                );

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
