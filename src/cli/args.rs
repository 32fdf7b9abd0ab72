use crate::core::{RetryPolicy, StoreConfig};
use crate::runner::RunConfig;
use crate::types::LockStrategy;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Replay balance updates against an in-memory ledger
#[derive(Parser, Debug)]
#[command(name = "ledger-locks")]
#[command(
    about = "Replay deposit and withdrawal requests with pessimistic or optimistic locking",
    long_about = None
)]
pub struct CliArgs {
    /// Input CSV file path containing update requests
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Concurrency-control strategy for every update
    #[arg(
        long = "lock",
        value_name = "STRATEGY",
        default_value = "optimistic",
        help = "Lock strategy: 'pessimistic' (row lock) or 'optimistic' (version check)"
    )]
    pub lock: LockType,

    /// Runtime executing the updates
    #[arg(
        long = "runtime",
        value_name = "RUNTIME",
        default_value = "async",
        help = "Runtime: 'sync' for a thread pool or 'async' for tokio tasks"
    )]
    pub runtime: RuntimeType,

    /// Number of concurrent workers
    #[arg(
        long = "workers",
        value_name = "COUNT",
        help = "Number of concurrent workers (default: CPU cores)"
    )]
    pub workers: Option<usize>,

    /// Retries for conflicts and storage errors
    #[arg(
        long = "max-retries",
        value_name = "COUNT",
        default_value_t = 0,
        help = "Retries of retryable failures per request (0 reports conflicts as-is)"
    )]
    pub max_retries: u32,

    /// Initial retry backoff in milliseconds
    #[arg(
        long = "backoff-ms",
        value_name = "MILLIS",
        default_value_t = 1,
        help = "Delay before the first retry, doubled for each further retry"
    )]
    pub backoff_ms: u64,

    /// Row lock wait limit in milliseconds
    #[arg(
        long = "lock-timeout-ms",
        value_name = "MILLIS",
        help = "Fail a lock wait as a storage error after this long (default: wait forever)"
    )]
    pub lock_timeout_ms: Option<u64>,

    /// Log filter for stderr output
    #[arg(
        long = "log-level",
        value_name = "FILTER",
        help = "Log filter such as 'info' or 'ledger_locks=debug' (default: RUST_LOG or 'warn')"
    )]
    pub log_level: Option<String>,
}

/// Lock strategies selectable on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LockType {
    Pessimistic,
    Optimistic,
}

impl From<LockType> for LockStrategy {
    fn from(lock: LockType) -> Self {
        match lock {
            LockType::Pessimistic => LockStrategy::Pessimistic,
            LockType::Optimistic => LockStrategy::Optimistic,
        }
    }
}

/// Available runtimes for replaying requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RuntimeType {
    Sync,
    Async,
}

impl CliArgs {
    /// Create a RunConfig from CLI arguments
    ///
    /// Missing values fall back to defaults; invalid ones are replaced by
    /// defaults with a warning.
    pub fn to_run_config(&self) -> RunConfig {
        let default = RunConfig::default();

        let retry = RetryPolicy::new(self.max_retries, Duration::from_millis(self.backoff_ms));
        let store = match self.lock_timeout_ms {
            Some(millis) => StoreConfig::with_lock_timeout(Duration::from_millis(millis)),
            None => StoreConfig::default(),
        };

        RunConfig::new(
            self.workers.unwrap_or(default.workers),
            self.lock.into(),
            retry,
            store,
        )
    }
}
