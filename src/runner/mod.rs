//! Replay runners
//!
//! A runner reads update requests from a CSV file, applies them concurrently
//! through an update coordinator and writes the final account states to an
//! output. Two runtimes are available and selected at runtime:
//!
//! - [`SyncRunner`] - a pool of OS threads fed through a bounded channel
//! - [`AsyncRunner`] - tokio tasks on a multi-threaded runtime, bounded by a
//!   semaphore
//!
//! Both provision every account named by a request (balance 0, version 0)
//! before that request is dispatched.

use crate::cli::RuntimeType;
use crate::core::{RetryOutcome, RetryPolicy, StoreConfig};
use crate::types::{ErrorKind, LockStrategy, UpdateRequest};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tracing::warn;

pub mod r#async;
pub mod sync;

pub use self::r#async::AsyncRunner;
pub use sync::SyncRunner;

/// Runner trait for complete replay pipelines
pub trait Runner: Send + Sync {
    /// Replay requests from `input_path` and write account states to `output`
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the input CSV file with `account,action,amount` rows
    /// * `output` - Writer receiving the `account,balance,version` CSV
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` once every request has been applied or rejected
    /// * `Err(String)` if a fatal error occurred (file not found, runtime or
    ///   output failure)
    ///
    /// Rejected requests and unparseable rows are logged and counted in the
    /// summary; they never abort the run.
    fn run(&self, input_path: &Path, output: &mut dyn Write) -> Result<RunSummary, String>;
}

/// Configuration shared by both runners
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of concurrent workers (threads or in-flight tasks)
    pub workers: usize,
    /// Lock strategy every request is applied with
    pub lock: LockStrategy,
    /// Caller-side retry policy
    pub retry: RetryPolicy,
    /// Store settings
    pub store: StoreConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            lock: LockStrategy::Optimistic,
            retry: RetryPolicy::none(),
            store: StoreConfig::default(),
        }
    }
}

impl RunConfig {
    /// Create a RunConfig, falling back to the default worker count for 0
    pub fn new(workers: usize, lock: LockStrategy, retry: RetryPolicy, store: StoreConfig) -> Self {
        let default = Self::default();

        let workers = if workers == 0 {
            warn!(
                "Invalid workers ({}), using default ({})",
                workers, default.workers
            );
            default.workers
        } else {
            workers
        };

        Self {
            workers,
            lock,
            retry,
            store,
        }
    }
}

/// Counters collected over a replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Requests that committed
    pub applied: u64,
    /// Requests that failed, by error kind
    pub rejected: HashMap<ErrorKind, u64>,
    /// Attempts that were retried under the retry policy
    pub retries: u64,
    /// Input rows that could not be parsed into a request
    pub skipped: u64,
}

impl RunSummary {
    /// Count the outcome of one request
    pub fn record(&mut self, outcome: &RetryOutcome) {
        match &outcome.result {
            Ok(_) => self.applied += 1,
            Err(e) => *self.rejected.entry(e.kind()).or_default() += 1,
        }
        self.retries += u64::from(outcome.retries);
    }

    /// Add the counters of `other` to this summary
    pub fn merge(&mut self, other: RunSummary) {
        self.applied += other.applied;
        self.retries += other.retries;
        self.skipped += other.skipped;
        for (kind, count) in other.rejected {
            *self.rejected.entry(kind).or_default() += count;
        }
    }

    /// Rejections of a single kind
    pub fn rejected_of(&self, kind: ErrorKind) -> u64 {
        self.rejected.get(&kind).copied().unwrap_or(0)
    }

    /// Rejections of every kind
    pub fn rejected_total(&self) -> u64 {
        self.rejected.values().sum()
    }
}

/// Log a request that ended in an error
pub(crate) fn log_rejection(request: &UpdateRequest, outcome: &RetryOutcome) {
    if let Err(e) = &outcome.result {
        warn!(
            account = ?request.account_id,
            action = %request.action,
            kind = %e.kind(),
            retries = outcome.retries,
            "Update rejected: {}",
            e
        );
    }
}

/// Create a runner for the selected runtime
///
/// # Arguments
///
/// * `runtime` - Sync (thread pool) or Async (tokio tasks)
/// * `config` - Worker count, lock strategy, retry policy and store settings
///
/// # Returns
///
/// A boxed trait object implementing the Runner trait
pub fn create_runner(runtime: RuntimeType, config: RunConfig) -> Box<dyn Runner> {
    match runtime {
        RuntimeType::Sync => Box::new(SyncRunner::new(config)),
        RuntimeType::Async => Box::new(AsyncRunner::new(config)),
    }
}
