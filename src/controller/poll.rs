//! Bounded, cancellable polling.
//!
//! Every multi-stage wait in the reconciler goes through [`await_condition`]:
//! check immediately, then re-check every `interval` until the check yields a
//! value, the `timeout` elapses, or the run is cancelled.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{Error, Result};

/// Default interval between checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on a single wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);

/// Interval and bound for a polled wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Time between checks
    pub interval: Duration,
    /// Bound on the whole wait
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Wait until `check` yields `Some`.
///
/// `Ok(None)` from `check` means "not yet". Errors from `check` are returned
/// immediately; callers swallow not-found before it reaches here.
pub async fn await_condition<T, F, Fut>(
    resource: &str,
    settings: &PollSettings,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    let deadline = start + settings.timeout;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("waiting for {}", resource)));
        }

        attempt += 1;
        if let Some(value) = check().await? {
            debug!(
                resource = %resource,
                attempt,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Condition met"
            );
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(
                resource = %resource,
                attempt,
                timeout_secs = settings.timeout.as_secs(),
                "Timed out waiting for condition"
            );
            return Err(Error::Timeout {
                resource: resource.to_string(),
                timeout: settings.timeout,
            });
        }

        debug!(resource = %resource, attempt, "Condition not yet met");
        let nap = settings.interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled(format!("waiting for {}", resource)));
            }
            _ = tokio::time::sleep(nap) => {}
        }
    }
}
