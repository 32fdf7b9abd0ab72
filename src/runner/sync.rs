//! Thread-pool runner
//!
//! Reads requests with the streaming [`SyncReader`] on the calling thread and
//! hands them to `workers` scoped threads over a bounded crossbeam channel.
//! Each worker applies its requests through a shared [`UpdateCoordinator`]
//! backed by a [`MemoryAccountStore`], so requests for the same account
//! genuinely contend for its row lock.
//!
//! # Memory Efficiency
//!
//! The channel holds at most two requests per worker; the reader blocks
//! when workers fall behind, so memory does not grow with the input size.

use crate::core::{MemoryAccountStore, UpdateCoordinator};
use crate::io::csv_format::write_accounts_csv;
use crate::io::sync_reader::SyncReader;
use crate::runner::{log_rejection, RunConfig, RunSummary, Runner};
use crate::types::UpdateRequest;
use crossbeam::channel;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Runner backed by OS threads
#[derive(Debug, Clone)]
pub struct SyncRunner {
    config: RunConfig,
}

impl SyncRunner {
    /// Create a SyncRunner with the specified configuration
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }
}

impl Runner for SyncRunner {
    fn run(&self, input_path: &Path, output: &mut dyn Write) -> Result<RunSummary, String> {
        let store = Arc::new(MemoryAccountStore::with_config(self.config.store.clone()));
        let coordinator = UpdateCoordinator::new(Arc::clone(&store));
        let reader = SyncReader::open(input_path)?;

        let workers = self.config.workers.max(1);
        let lock = self.config.lock;
        let retry = &self.config.retry;
        let (sender, receiver) = channel::bounded::<UpdateRequest>(workers * 2);

        let summary = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let receiver = receiver.clone();
                    let coordinator = coordinator.clone();
                    scope.spawn(move || {
                        let mut summary = RunSummary::default();
                        for request in receiver.iter() {
                            let outcome = coordinator.apply_with_retry(&request, lock, retry);
                            log_rejection(&request, &outcome);
                            summary.record(&outcome);
                        }
                        debug!(worker, applied = summary.applied, "worker finished");
                        summary
                    })
                })
                .collect();
            drop(receiver);

            let mut summary = RunSummary::default();
            for result in reader {
                match result {
                    Ok(request) => {
                        if let Some(id) = request.account_id {
                            store.create_account(id);
                        }
                        if sender.send(request).is_err() {
                            // Every worker is gone; joining below reports why
                            break;
                        }
                    }
                    Err(e) => {
                        summary.skipped += 1;
                        warn!("Skipping record: {}", e);
                    }
                }
            }
            drop(sender);

            for handle in handles {
                let worker_summary = handle
                    .join()
                    .map_err(|_| "Worker thread panicked".to_string())?;
                summary.merge(worker_summary);
            }
            Ok::<_, String>(summary)
        })?;

        write_accounts_csv(&store.accounts(), output)?;

        Ok(summary)
    }
}
