//! Caller-side retry policy
//!
//! Conflict detection lives in the optimistic strategy; deciding whether and
//! how often to try again is up to the caller. `RetryPolicy` packages the
//! usual choice: a bounded number of retries of retryable errors
//! (`Conflict`, `StorageError`) with capped exponential backoff.
//!
//! Each retry re-runs the complete update, including a fresh read, so it
//! never reuses a stale version.

use crate::types::{LedgerError, UpdateOutcome};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Bounded retry with capped exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 surfaces the first error)
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further retry
    pub base_backoff: Duration,
    /// Upper bound on a single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(100),
        }
    }
}

/// Final result of a retried update
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    /// Result of the last attempt
    pub result: Result<UpdateOutcome, LedgerError>,
    /// Number of failed attempts that were retried
    pub retries: u32,
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self::default()
    }

    /// Retry up to `max_retries` times starting at `base_backoff`
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        let default = Self::default();
        Self {
            max_retries,
            base_backoff,
            max_backoff: default.max_backoff.max(base_backoff),
        }
    }

    /// Retry until success or a terminal error, without sleeping
    pub fn unbounded() -> Self {
        Self {
            max_retries: u32::MAX,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Whether `error` should be retried after `retries` earlier retries
    pub fn should_retry(&self, error: &LedgerError, retries: u32) -> bool {
        error.is_retryable() && retries < self.max_retries
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `attempt` on the current thread until it succeeds or gives up
    pub fn run<F>(&self, mut attempt: F) -> RetryOutcome
    where
        F: FnMut() -> Result<UpdateOutcome, LedgerError>,
    {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(e) if self.should_retry(&e, retries) => {
                    retries += 1;
                    debug!(retry = retries, error = %e, "retrying update");
                    let delay = self.delay(retries);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                result => return RetryOutcome { result, retries },
            }
        }
    }

    /// Async counterpart of [`run`](Self::run), sleeping on the tokio timer
    pub async fn run_async<F, Fut>(&self, mut attempt: F) -> RetryOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<UpdateOutcome, LedgerError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if self.should_retry(&e, retries) => {
                    retries += 1;
                    debug!(retry = retries, error = %e, "retrying update");
                    let delay = self.delay(retries);
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(delay).await;
                    }
                }
                result => return RetryOutcome { result, retries },
            }
        }
    }
}
