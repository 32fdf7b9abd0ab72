//! Ledger Locks CLI
//!
//! Command-line interface for replaying balance updates from CSV files.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- requests.csv > accounts.csv
//! cargo run -- --lock pessimistic --runtime sync requests.csv > accounts.csv
//! cargo run -- --lock optimistic --max-retries 10 --workers 8 requests.csv > accounts.csv
//! RUST_LOG=ledger_locks=debug cargo run -- requests.csv > accounts.csv
//! ```
//!
//! The program reads update requests from the input CSV file, applies them
//! concurrently with the selected lock strategy and runtime, and writes the
//! final account states to stdout. Logs go to stderr.
//!
//! # Exit Codes
//!
//! - 0: Success (rejected updates do not change the exit code)
//! - 1: Error (missing arguments, file not found, runtime or output failure)

use ledger_locks::cli;
use ledger_locks::runner;
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let args = cli::parse_args();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = args.to_run_config();
    info!(
        lock = %config.lock,
        runtime = ?args.runtime,
        workers = config.workers,
        max_retries = config.retry.max_retries,
        "starting replay"
    );
    let runner = runner::create_runner(args.runtime, config);

    let mut output = std::io::stdout();
    match runner.run(&args.input_file, &mut output) {
        Ok(summary) => {
            let mut rejected: Vec<_> = summary.rejected.iter().collect();
            rejected.sort_by_key(|(kind, _)| kind.as_str());
            for (kind, count) in rejected {
                info!(%kind, count, "rejected updates");
            }
            info!(
                applied = summary.applied,
                rejected = summary.rejected_total(),
                retries = summary.retries,
                skipped = summary.skipped,
                "replay finished"
            );
        }
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
