//! End-to-end replay tests
//!
//! Each directory under `tests/fixtures/` holds an `input.csv` of requests
//! and the `expected.csv` account snapshot a replay must print. The fixtures
//! cover:
//! - plain deposits and withdrawals on several accounts
//! - withdrawals rejected for insufficient balance
//! - invalid requests next to malformed rows
//! - four-decimal output precision
//! - many workers hammering a handful of accounts
//!
//! Every fixture runs under both runtimes and both lock strategies. Fixtures
//! whose outcome depends on request order get a single worker; the contention
//! fixture only deposits, so any interleaving yields the same snapshot.

#[cfg(test)]
mod tests {
    use ledger_locks::cli::RuntimeType;
    use ledger_locks::core::{RetryPolicy, StoreConfig};
    use ledger_locks::runner::{create_runner, RunConfig};
    use ledger_locks::types::LockStrategy;
    use rstest::rstest;
    use std::fs;
    use std::path::PathBuf;

    fn fixture_file(fixture: &str, file: &str) -> PathBuf {
        let path = PathBuf::from("tests/fixtures").join(fixture).join(file);
        assert!(path.exists(), "Fixture file not found: {}", path.display());
        path
    }

    /// Replay `fixture` and return the printed snapshot
    fn replay(fixture: &str, workers: usize, runtime: RuntimeType, lock: LockStrategy) -> String {
        // Conflicts are retried so the snapshot does not depend on scheduling
        let config = RunConfig::new(workers, lock, RetryPolicy::unbounded(), StoreConfig::default());
        let mut printed = Vec::new();

        create_runner(runtime, config)
            .run(&fixture_file(fixture, "input.csv"), &mut printed)
            .unwrap_or_else(|e| panic!("Replay of {} failed: {}", fixture, e));

        String::from_utf8(printed).expect("Snapshot is not UTF-8")
    }

    #[rstest]
    #[case("happy_path", 1)]
    #[case("insufficient_balance", 1)]
    #[case("invalid_requests", 1)]
    #[case("precision", 1)]
    #[case("contention", 8)]
    fn test_fixtures(
        #[case] fixture: &str,
        #[case] workers: usize,
        #[values(RuntimeType::Sync, RuntimeType::Async)] runtime: RuntimeType,
        #[values(LockStrategy::Pessimistic, LockStrategy::Optimistic)] lock: LockStrategy,
    ) {
        let expected = fs::read_to_string(fixture_file(fixture, "expected.csv"))
            .unwrap_or_else(|e| panic!("Failed to read expected snapshot of {}: {}", fixture, e));

        let actual = replay(fixture, workers, runtime, lock);

        assert_eq!(
            actual, expected,
            "\nSnapshot mismatch for {} ({:?} runtime, {} locking)\n\nActual:\n{}\nExpected:\n{}",
            fixture, runtime, lock, actual, expected
        );
    }
}
