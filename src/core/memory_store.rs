//! In-memory account store with per-row locks
//!
//! This module provides `MemoryAccountStore`, an implementation of the
//! [`AccountStore`] contract that behaves like a row-locking database:
//!
//! - Committed rows live in a `DashMap`, one `Row` per account
//! - Each row carries the id of the transaction holding its exclusive lock,
//!   guarded by a `parking_lot` mutex and a condition variable for waiters
//! - Writes are staged inside the transaction and only become visible on commit
//! - Dropping an unfinished transaction rolls it back
//!
//! # Thread Safety
//!
//! The store is `Send + Sync` and meant to be shared by reference (or `Arc`)
//! between worker threads. Lookups of different accounts never contend on
//! the same row mutex, and the row mutex itself is only held for the short
//! critical sections that inspect or update `RowState`. Waiting for a row lock
//! happens on the condition variable, not while holding a map shard.

use super::traits::{AccountStore, StoreTransaction, WriteOutcome};
use crate::types::{Account, AccountId, StoreError};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

type TxId = u64;

/// Store configuration
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Maximum time to wait for another transaction's row lock
    ///
    /// `None` waits until the holder commits or rolls back.
    pub lock_wait_timeout: Option<Duration>,
}

impl StoreConfig {
    /// Configuration with a bounded lock wait
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self {
            lock_wait_timeout: Some(timeout),
        }
    }
}

/// Store operation that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Begin,
    Read,
    Write,
    Commit,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOp::Begin => f.write_str("begin"),
            StoreOp::Read => f.write_str("read"),
            StoreOp::Write => f.write_str("write"),
            StoreOp::Commit => f.write_str("commit"),
        }
    }
}

#[derive(Debug)]
struct RowState {
    /// `None` once the account has been removed
    committed: Option<Account>,
    /// Transaction holding the exclusive row lock
    holder: Option<TxId>,
}

#[derive(Debug)]
struct Row {
    state: Mutex<RowState>,
    released: Condvar,
}

impl Row {
    fn new(account: Account) -> Self {
        Row {
            state: Mutex::new(RowState {
                committed: Some(account),
                holder: None,
            }),
            released: Condvar::new(),
        }
    }
}

/// Thread-safe in-memory account store
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    rows: DashMap<AccountId, Arc<Row>>,
    config: StoreConfig,
    next_tx: AtomicU64,
    commits: AtomicU64,
    faults: Mutex<HashSet<StoreOp>>,
}

impl MemoryAccountStore {
    /// Create an empty store that waits forever for row locks
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given configuration
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Provision an account with zero balance and version 0
    ///
    /// Returns `false` if the account already existed (it is left untouched).
    /// A removed account is provisioned afresh.
    pub fn create_account(&self, id: AccountId) -> bool {
        let mut inserted = false;
        let row = Arc::clone(
            self.rows
                .entry(id)
                .or_insert_with(|| {
                    inserted = true;
                    Arc::new(Row::new(Account::new(id)))
                })
                .value(),
        );
        if inserted {
            return true;
        }

        let mut state = row.state.lock();
        if state.committed.is_some() {
            return false;
        }
        state.committed = Some(Account::new(id));
        true
    }

    /// Insert or overwrite the committed state of an account
    pub fn seed(&self, account: Account) {
        let existing = self.rows.get(&account.id).map(|row| Arc::clone(row.value()));
        match existing {
            Some(row) => row.state.lock().committed = Some(account),
            None => {
                self.rows.insert(account.id, Arc::new(Row::new(account)));
            }
        }
    }

    /// Delete an account, bypassing row locks
    ///
    /// Models an external actor removing the row underneath running
    /// transactions.
    pub fn remove_account(&self, id: AccountId) -> Option<Account> {
        let row = self.rows.get(&id).map(|row| Arc::clone(row.value()))?;
        let removed = row.state.lock().committed.take();
        removed
    }

    /// Committed state of an account
    pub fn account(&self, id: AccountId) -> Option<Account> {
        let row = self.rows.get(&id).map(|row| Arc::clone(row.value()))?;
        let account = row.state.lock().committed.clone();
        account
    }

    /// Committed state of every account, sorted by id
    pub fn accounts(&self) -> Vec<Account> {
        let rows: Vec<Arc<Row>> = self.rows.iter().map(|row| Arc::clone(row.value())).collect();
        let mut accounts: Vec<Account> = rows
            .iter()
            .filter_map(|row| row.state.lock().committed.clone())
            .collect();
        accounts.sort_by_key(|account| account.id);
        accounts
    }

    /// Number of transactions that committed at least one write
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Make the next call of `op` fail with a backend error
    pub fn fail_next(&self, op: StoreOp) {
        self.faults.lock().insert(op);
    }

    fn check_fault(&self, op: StoreOp) -> Result<(), StoreError> {
        if self.faults.lock().remove(&op) {
            return Err(StoreError::backend(format!("injected {} failure", op)));
        }
        Ok(())
    }

    fn row(&self, id: AccountId) -> Result<Arc<Row>, StoreError> {
        self.rows
            .get(&id)
            .map(|row| Arc::clone(row.value()))
            .ok_or(StoreError::NotFound { account: id })
    }

    /// Take the exclusive lock on `row` for transaction `tx`
    ///
    /// Re-entrant for the holder. The returned guard protects `RowState`
    /// only; the row lock itself outlives it until `release`.
    fn lock_row<'r>(
        &self,
        tx: TxId,
        id: AccountId,
        row: &'r Row,
    ) -> Result<MutexGuard<'r, RowState>, StoreError> {
        let mut state = row.state.lock();
        let deadline = self.config.lock_wait_timeout.map(|t| Instant::now() + t);

        while state.holder.is_some_and(|holder| holder != tx) {
            trace!(account = id, tx, "waiting for row lock");
            match deadline {
                Some(deadline) => {
                    let timed_out = row.released.wait_until(&mut state, deadline).timed_out();
                    if timed_out && state.holder.is_some_and(|holder| holder != tx) {
                        debug!(account = id, tx, "row lock wait timed out");
                        return Err(StoreError::LockTimeout { account: id });
                    }
                }
                None => row.released.wait(&mut state),
            }
        }

        state.holder = Some(tx);
        Ok(state)
    }
}

impl AccountStore for MemoryAccountStore {
    type Tx<'a> = MemoryTransaction<'a>;

    fn begin(&self) -> Result<MemoryTransaction<'_>, StoreError> {
        self.check_fault(StoreOp::Begin)?;
        Ok(MemoryTransaction {
            store: self,
            id: self.next_tx.fetch_add(1, Ordering::SeqCst),
            locked: HashMap::new(),
            staged: HashMap::new(),
            finished: false,
        })
    }
}

/// Transaction over a [`MemoryAccountStore`]
#[derive(Debug)]
pub struct MemoryTransaction<'s> {
    store: &'s MemoryAccountStore,
    id: TxId,
    /// Rows whose lock this transaction holds
    locked: HashMap<AccountId, Arc<Row>>,
    /// Writes that become visible on commit
    staged: HashMap<AccountId, Account>,
    finished: bool,
}

impl MemoryTransaction<'_> {
    /// Release every row lock and wake waiters
    fn release(&mut self) {
        for (_, row) in self.locked.drain() {
            let mut state = row.state.lock();
            if state.holder == Some(self.id) {
                state.holder = None;
            }
            drop(state);
            row.released.notify_all();
        }
        self.staged.clear();
        self.finished = true;
    }

    /// Lock `id` and run `f` over its state; the lock stays held afterwards
    fn with_locked_row<T>(
        &mut self,
        id: AccountId,
        f: impl FnOnce(&RowState, &HashMap<AccountId, Account>) -> T,
    ) -> Result<T, StoreError> {
        let row = self.store.row(id)?;
        let state = self.store.lock_row(self.id, id, &row)?;
        let result = f(&state, &self.staged);
        drop(state);
        self.locked.insert(id, row);
        Ok(result)
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn read_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.store.check_fault(StoreOp::Read)?;
        self.with_locked_row(id, |state, staged| {
            staged.get(&id).cloned().or_else(|| state.committed.clone())
        })?
        .ok_or(StoreError::NotFound { account: id })
    }

    fn read_snapshot(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.store.check_fault(StoreOp::Read)?;
        if let Some(account) = self.staged.get(&id) {
            return Ok(account.clone());
        }
        let row = self.store.row(id)?;
        let account = row.state.lock().committed.clone();
        account.ok_or(StoreError::NotFound { account: id })
    }

    fn write(&mut self, id: AccountId, new_balance: Decimal) -> Result<WriteOutcome, StoreError> {
        self.store.check_fault(StoreOp::Write)?;
        let committed = self.with_locked_row(id, |state, _| state.committed.clone())?;
        let Some(committed) = committed else {
            return Ok(WriteOutcome::RowMissing);
        };

        self.staged.insert(
            id,
            Account {
                id,
                balance: new_balance,
                version: committed.version + 1,
            },
        );
        Ok(WriteOutcome::Applied)
    }

    fn conditional_write(
        &mut self,
        id: AccountId,
        expected_version: u64,
        new_balance: Decimal,
        new_version: u64,
    ) -> Result<WriteOutcome, StoreError> {
        self.store.check_fault(StoreOp::Write)?;
        let committed = self.with_locked_row(id, |state, _| state.committed.clone())?;
        let Some(committed) = committed else {
            return Ok(WriteOutcome::RowMissing);
        };

        if committed.version != expected_version {
            return Ok(WriteOutcome::VersionMismatch {
                expected: expected_version,
                actual: committed.version,
            });
        }

        self.staged.insert(
            id,
            Account {
                id,
                balance: new_balance,
                version: new_version,
            },
        );
        Ok(WriteOutcome::Applied)
    }

    fn commit(mut self) -> Result<(), StoreError> {
        // Dropping `self` on an error path rolls back
        self.store.check_fault(StoreOp::Commit)?;

        if !self.staged.is_empty() {
            let mut ids: Vec<AccountId> = self.staged.keys().copied().collect();
            ids.sort_unstable();

            let mut guards = Vec::with_capacity(ids.len());
            for id in &ids {
                let row = self
                    .locked
                    .get(id)
                    .ok_or_else(|| StoreError::backend(format!("write to account {} without row lock", id)))?;
                let state = row.state.lock();
                if state.committed.is_none() {
                    return Err(StoreError::backend(format!(
                        "account {} was removed before commit",
                        id
                    )));
                }
                guards.push(state);
            }

            for (id, state) in ids.iter().zip(guards.iter_mut()) {
                state.committed = self.staged.remove(id);
            }
            drop(guards);
            self.store.commits.fetch_add(1, Ordering::SeqCst);
        }

        trace!(tx = self.id, "transaction committed");
        self.release();
        Ok(())
    }

    fn rollback(mut self) {
        trace!(tx = self.id, "transaction rolled back");
        self.release();
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(tx = self.id, "transaction dropped before commit, rolling back");
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn store_with(id: AccountId, balance: i64) -> MemoryAccountStore {
        let store = MemoryAccountStore::new();
        store.seed(Account::with_balance(id, Decimal::new(balance, 0)));
        store
    }

    #[test]
    fn test_create_account_starts_at_zero() {
        let store = MemoryAccountStore::new();

        assert!(store.create_account(1));
        assert!(!store.create_account(1));

        let account = store.account(1).unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.version, 0);
    }

    #[test]
    fn test_create_account_after_remove_provisions_again() {
        let store = store_with(1, 25);

        assert_eq!(store.remove_account(1).unwrap().balance, Decimal::new(25, 0));
        assert_eq!(store.account(1), None);
        assert!(store.accounts().is_empty());

        assert!(store.create_account(1));
        assert_eq!(store.account(1).unwrap(), Account::new(1));
        assert!(!store.create_account(1));

        let mut tx = store.begin().unwrap();
        tx.read_for_update(1).unwrap();
        tx.write(1, Decimal::new(3, 0)).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.account(1).unwrap().version, 1);
    }

    #[test]
    fn test_reads_of_missing_account_report_not_found() {
        let store = MemoryAccountStore::new();
        let mut tx = store.begin().unwrap();

        assert_eq!(tx.read_snapshot(5), Err(StoreError::NotFound { account: 5 }));
        assert_eq!(tx.read_for_update(5), Err(StoreError::NotFound { account: 5 }));
    }

    #[test]
    fn test_staged_write_invisible_until_commit() {
        let store = store_with(1, 100);
        let mut tx = store.begin().unwrap();

        let outcome = tx.write(1, Decimal::new(60, 0)).unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);
        assert_eq!(store.account(1).unwrap().balance, Decimal::new(100, 0));

        tx.commit().unwrap();
        let account = store.account(1).unwrap();
        assert_eq!(account.balance, Decimal::new(60, 0));
        assert_eq!(account.version, 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_rollback_discards_staged_write() {
        let store = store_with(1, 100);
        let mut tx = store.begin().unwrap();
        tx.write(1, Decimal::new(10, 0)).unwrap();
        tx.rollback();

        assert_eq!(store.account(1).unwrap(), Account::with_balance(1, Decimal::new(100, 0)));
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn test_drop_rolls_back_and_releases_lock() {
        let store = store_with(1, 100);
        {
            let mut tx = store.begin().unwrap();
            tx.read_for_update(1).unwrap();
            tx.write(1, Decimal::new(1, 0)).unwrap();
        }

        // A second transaction can lock the row immediately
        let mut tx = store.begin().unwrap();
        assert_eq!(tx.read_for_update(1).unwrap().balance, Decimal::new(100, 0));
        tx.rollback();
    }

    #[test]
    fn test_conditional_write_rejects_stale_version() {
        let store = store_with(1, 100);

        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        let seen_by_first = first.read_snapshot(1).unwrap();
        let seen_by_second = second.read_snapshot(1).unwrap();

        let outcome = first
            .conditional_write(1, seen_by_first.version, Decimal::new(110, 0), 1)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);
        first.commit().unwrap();

        let outcome = second
            .conditional_write(1, seen_by_second.version, Decimal::new(110, 0), 1)
            .unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::VersionMismatch {
                expected: 0,
                actual: 1
            }
        );
        second.rollback();

        assert_eq!(store.account(1).unwrap().version, 1);
    }

    #[test]
    fn test_read_for_update_blocks_until_holder_commits() {
        let store = Arc::new(store_with(1, 0));
        let (locked_tx, locked_rx) = mpsc::channel();

        let holder = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut tx = store.begin().unwrap();
                tx.read_for_update(1).unwrap();
                locked_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                tx.write(1, Decimal::new(5, 0)).unwrap();
                tx.commit().unwrap();
            })
        };

        locked_rx.recv().unwrap();
        let mut tx = store.begin().unwrap();
        // Must observe the holder's committed write, never the old balance
        let account = tx.read_for_update(1).unwrap();
        assert_eq!(account.balance, Decimal::new(5, 0));
        assert_eq!(account.version, 1);
        tx.rollback();

        holder.join().unwrap();
    }

    #[test]
    fn test_lock_wait_timeout() {
        let store = MemoryAccountStore::with_config(StoreConfig::with_lock_timeout(
            Duration::from_millis(20),
        ));
        store.create_account(1);

        let mut holder = store.begin().unwrap();
        holder.read_for_update(1).unwrap();

        let mut waiter = store.begin().unwrap();
        assert_eq!(
            waiter.read_for_update(1),
            Err(StoreError::LockTimeout { account: 1 })
        );
        waiter.rollback();
        holder.rollback();
    }

    #[test]
    fn test_write_to_removed_row_reports_row_missing() {
        let store = store_with(1, 10);
        let mut tx = store.begin().unwrap();
        tx.read_for_update(1).unwrap();

        store.remove_account(1);

        assert_eq!(tx.write(1, Decimal::ONE).unwrap(), WriteOutcome::RowMissing);
        tx.rollback();
    }

    #[test]
    fn test_injected_commit_failure_leaves_store_unchanged() {
        let store = store_with(1, 10);
        store.fail_next(StoreOp::Commit);

        let mut tx = store.begin().unwrap();
        tx.write(1, Decimal::ONE).unwrap();
        let err = tx.commit().unwrap_err();

        assert_eq!(err, StoreError::backend("injected commit failure"));
        assert_eq!(store.account(1).unwrap().balance, Decimal::new(10, 0));

        // The fault is consumed and the row lock was released
        let mut tx = store.begin().unwrap();
        tx.write(1, Decimal::ONE).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.account(1).unwrap().balance, Decimal::ONE);
    }

    #[test]
    fn test_accounts_sorted_by_id() {
        let store = MemoryAccountStore::new();
        store.create_account(3);
        store.create_account(1);
        store.create_account(2);

        let ids: Vec<AccountId> = store.accounts().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
