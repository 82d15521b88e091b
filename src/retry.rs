//! Retry with exponential backoff.
//!
//! Used at the one call site where the cluster is known to be briefly
//! inconsistent: subscription creation right after the previous subscription
//! was deleted. Delays are deterministic so the schedule is observable.
//!
//! # Example
//!
//! ```ignore
//! use upgrade_test::retry::{retry_with_backoff, RetryConfig};
//!
//! let sub = retry_with_backoff(
//!     &RetryConfig::subscription_create(),
//!     "create subscription demo",
//!     &cancel,
//!     || async { client.create(ResourceKind::Subscription, "ns", &obj).await },
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::controller::error::{Error, Result};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Subscription creation: 3 attempts, sleeping 1s then 2s between them.
    pub fn subscription_create() -> Self {
        Self::default()
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
        Duration::from_secs_f64(
            (self.initial_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Execute an async operation with exponential backoff.
///
/// Any error is retried until `max_attempts` is exhausted; the final error is
/// wrapped with the operation name and attempt count. Cancellation during a
/// backoff sleep returns `Error::Cancelled`.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e.context(format!(
                        "{} failed after {} attempts",
                        operation_name, attempt
                    )));
                }

                let delay = config.delay_after(attempt);
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(Error::Cancelled(format!("retrying {}", operation_name)));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
