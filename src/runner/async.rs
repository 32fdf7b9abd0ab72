//! Tokio task runner
//!
//! # Architecture
//!
//! ```text
//! AsyncRunner
//!     ├── RunConfig (workers, lock, retry, store)
//!     ├── AsyncReader (batch CSV reading)
//!     ├── Semaphore (at most `workers` updates in flight)
//!     └── AsyncUpdateCoordinator
//!         └── AsyncMemoryStore (tokio row locks)
//! ```
//!
//! Every request becomes its own task on a multi-threaded runtime with
//! `workers` worker threads. A pessimistic update waiting on a row lock
//! parks its task rather than a thread, so other accounts keep making
//! progress while one account is contended.

use crate::core::r#async::{AsyncMemoryStore, AsyncUpdateCoordinator};
use crate::core::RetryOutcome;
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::write_accounts_csv;
use crate::runner::{log_rejection, RunConfig, RunSummary, Runner};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::compat::TokioAsyncReadCompatExt;

/// Number of CSV rows read per batch
const READ_BATCH_SIZE: usize = 256;

/// Runner backed by tokio tasks
#[derive(Debug, Clone)]
pub struct AsyncRunner {
    config: RunConfig,
}

impl AsyncRunner {
    /// Create an AsyncRunner with the specified configuration
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    async fn replay(&self, input_path: &Path, output: &mut dyn Write) -> Result<RunSummary, String> {
        let store = Arc::new(AsyncMemoryStore::with_config(self.config.store.clone()));
        let coordinator = AsyncUpdateCoordinator::new(Arc::clone(&store));

        let file = tokio::fs::File::open(input_path)
            .await
            .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;
        let mut reader = AsyncReader::new(file.compat());

        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut summary = RunSummary::default();

        loop {
            let batch = reader.read_batch(READ_BATCH_SIZE).await;
            if batch.is_empty() {
                break;
            }

            for request in batch {
                if let Some(id) = request.account_id {
                    store.create_account(id);
                }

                let permit = Arc::clone(&permits)
                    .acquire_owned()
                    .await
                    .map_err(|e| format!("Worker semaphore closed: {}", e))?;
                let coordinator = coordinator.clone();
                let lock = self.config.lock;
                let retry = self.config.retry.clone();

                tasks.spawn(async move {
                    let outcome = coordinator.apply_with_retry(&request, lock, &retry).await;
                    drop(permit);
                    log_rejection(&request, &outcome);
                    outcome
                });

                while let Some(joined) = tasks.try_join_next() {
                    summary.record(&completed(joined)?);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            summary.record(&completed(joined)?);
        }
        summary.skipped = reader.skipped();

        write_accounts_csv(&store.accounts(), output)?;

        Ok(summary)
    }
}

fn completed(joined: Result<RetryOutcome, JoinError>) -> Result<RetryOutcome, String> {
    joined.map_err(|e| format!("Update task failed: {}", e))
}

impl Runner for AsyncRunner {
    fn run(&self, input_path: &Path, output: &mut dyn Write) -> Result<RunSummary, String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.workers.max(1))
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(self.replay(input_path, output))
    }
}
