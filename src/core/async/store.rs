//! Task-friendly in-memory account store
//!
//! This module provides `AsyncMemoryStore`, the tokio counterpart of
//! [`MemoryAccountStore`](crate::core::MemoryAccountStore). Waiting for a row
//! lock suspends the task instead of blocking a worker thread.
//!
//! # Design
//!
//! - Committed rows live in a `DashMap`; each row keeps its committed state
//!   behind a short-lived `parking_lot` mutex that is never held across an
//!   `.await`
//! - The exclusive row lock is an `Arc<tokio::sync::Mutex<()>>`. A
//!   transaction stores the `OwnedMutexGuard` for each row it locked, so the
//!   lock lives exactly as long as the transaction
//! - Dropping a transaction (including dropping the future that owns it
//!   when a caller abandons a request) releases its locks and discards its
//!   staged writes, which is a rollback

use super::traits::{AsyncAccountStore, AsyncStoreTransaction};
use crate::core::memory_store::{StoreConfig, StoreOp};
use crate::core::traits::WriteOutcome;
use crate::types::{Account, AccountId, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, trace};

#[derive(Debug)]
struct AsyncRow {
    /// `None` once the account has been removed
    committed: Mutex<Option<Account>>,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl AsyncRow {
    fn new(account: Account) -> Self {
        AsyncRow {
            committed: Mutex::new(Some(account)),
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// Thread-safe, task-friendly in-memory account store
#[derive(Debug, Default)]
pub struct AsyncMemoryStore {
    rows: DashMap<AccountId, Arc<AsyncRow>>,
    config: StoreConfig,
    next_tx: AtomicU64,
    commits: AtomicU64,
    faults: Mutex<HashSet<StoreOp>>,
}

impl AsyncMemoryStore {
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
    /// Returns `false` if the account already existed. A removed account is
    /// provisioned afresh.
    pub fn create_account(&self, id: AccountId) -> bool {
        let mut inserted = false;
        let row = Arc::clone(
            self.rows
                .entry(id)
                .or_insert_with(|| {
                    inserted = true;
                    Arc::new(AsyncRow::new(Account::new(id)))
                })
                .value(),
        );
        if inserted {
            return true;
        }

        let mut committed = row.committed.lock();
        if committed.is_some() {
            return false;
        }
        *committed = Some(Account::new(id));
        true
    }

    /// Insert or overwrite the committed state of an account
    pub fn seed(&self, account: Account) {
        let existing = self.rows.get(&account.id).map(|row| Arc::clone(row.value()));
        match existing {
            Some(row) => *row.committed.lock() = Some(account),
            None => {
                self.rows.insert(account.id, Arc::new(AsyncRow::new(account)));
            }
        }
    }

    /// Delete an account, bypassing row locks
    pub fn remove_account(&self, id: AccountId) -> Option<Account> {
        let row = self.rows.get(&id).map(|row| Arc::clone(row.value()))?;
        let removed = row.committed.lock().take();
        removed
    }

    /// Committed state of an account
    pub fn account(&self, id: AccountId) -> Option<Account> {
        let row = self.rows.get(&id).map(|row| Arc::clone(row.value()))?;
        let account = row.committed.lock().clone();
        account
    }

    /// Committed state of every account, sorted by id
    pub fn accounts(&self) -> Vec<Account> {
        let rows: Vec<Arc<AsyncRow>> = self.rows.iter().map(|row| Arc::clone(row.value())).collect();
        let mut accounts: Vec<Account> = rows
            .iter()
            .filter_map(|row| row.committed.lock().clone())
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

    fn row(&self, id: AccountId) -> Result<Arc<AsyncRow>, StoreError> {
        self.rows
            .get(&id)
            .map(|row| Arc::clone(row.value()))
            .ok_or(StoreError::NotFound { account: id })
    }
}

impl AsyncAccountStore for AsyncMemoryStore {
    type Tx<'a> = AsyncTransaction<'a>;

    fn begin(&self) -> Result<AsyncTransaction<'_>, StoreError> {
        self.check_fault(StoreOp::Begin)?;
        Ok(AsyncTransaction {
            store: self,
            id: self.next_tx.fetch_add(1, Ordering::SeqCst),
            locks: HashMap::new(),
            rows: HashMap::new(),
            staged: HashMap::new(),
        })
    }
}

/// Transaction over an [`AsyncMemoryStore`]
#[derive(Debug)]
pub struct AsyncTransaction<'s> {
    store: &'s AsyncMemoryStore,
    id: u64,
    /// Row locks held until the transaction ends
    locks: HashMap<AccountId, OwnedMutexGuard<()>>,
    rows: HashMap<AccountId, Arc<AsyncRow>>,
    /// Writes that become visible on commit
    staged: HashMap<AccountId, Account>,
}

impl AsyncTransaction<'_> {
    /// Take the row lock on `id` unless already held
    async fn lock_row(&mut self, id: AccountId) -> Result<Arc<AsyncRow>, StoreError> {
        let row = self.store.row(id)?;
        if self.locks.contains_key(&id) {
            return Ok(row);
        }

        let lock = Arc::clone(&row.lock);
        let guard = match self.store.config.lock_wait_timeout {
            Some(timeout) => tokio::time::timeout(timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    debug!(account = id, tx = self.id, "row lock wait timed out");
                    StoreError::LockTimeout { account: id }
                })?,
            None => lock.lock_owned().await,
        };

        self.locks.insert(id, guard);
        self.rows.insert(id, Arc::clone(&row));
        Ok(row)
    }
}

#[async_trait]
impl AsyncStoreTransaction for AsyncTransaction<'_> {
    async fn read_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.store.check_fault(StoreOp::Read)?;
        let row = self.lock_row(id).await?;
        if let Some(account) = self.staged.get(&id) {
            return Ok(account.clone());
        }
        let account = row.committed.lock().clone();
        account.ok_or(StoreError::NotFound { account: id })
    }

    async fn read_snapshot(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.store.check_fault(StoreOp::Read)?;
        if let Some(account) = self.staged.get(&id) {
            return Ok(account.clone());
        }
        let row = self.store.row(id)?;
        let account = row.committed.lock().clone();
        account.ok_or(StoreError::NotFound { account: id })
    }

    async fn write(
        &mut self,
        id: AccountId,
        new_balance: Decimal,
    ) -> Result<WriteOutcome, StoreError> {
        self.store.check_fault(StoreOp::Write)?;
        let row = self.lock_row(id).await?;
        let committed = row.committed.lock().clone();
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

    async fn conditional_write(
        &mut self,
        id: AccountId,
        expected_version: u64,
        new_balance: Decimal,
        new_version: u64,
    ) -> Result<WriteOutcome, StoreError> {
        self.store.check_fault(StoreOp::Write)?;
        let row = self.lock_row(id).await?;
        let committed = row.committed.lock().clone();
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
        self.store.check_fault(StoreOp::Commit)?;

        if !self.staged.is_empty() {
            let mut ids: Vec<AccountId> = self.staged.keys().copied().collect();
            ids.sort_unstable();

            let mut guards = Vec::with_capacity(ids.len());
            for id in &ids {
                let row = self.rows.get(id).ok_or_else(|| {
                    StoreError::backend(format!("write to account {} without row lock", id))
                })?;
                let committed = row.committed.lock();
                if committed.is_none() {
                    return Err(StoreError::backend(format!(
                        "account {} was removed before commit",
                        id
                    )));
                }
                guards.push(committed);
            }

            for (id, committed) in ids.iter().zip(guards.iter_mut()) {
                **committed = self.staged.remove(id);
            }
            drop(guards);
            self.store.commits.fetch_add(1, Ordering::SeqCst);
        }

        trace!(tx = self.id, "transaction committed");
        Ok(())
    }

    fn rollback(self) {
        trace!(tx = self.id, "transaction rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store_with(id: AccountId, balance: i64) -> Arc<AsyncMemoryStore> {
        let store = AsyncMemoryStore::new();
        store.seed(Account::with_balance(id, Decimal::new(balance, 0)));
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_staged_write_invisible_until_commit() {
        let store = store_with(1, 100);
        let mut tx = store.begin().unwrap();

        tx.write(1, Decimal::new(60, 0)).await.unwrap();
        assert_eq!(store.account(1).unwrap().balance, Decimal::new(100, 0));

        tx.commit().unwrap();
        let account = store.account(1).unwrap();
        assert_eq!(account.balance, Decimal::new(60, 0));
        assert_eq!(account.version, 1);
    }

    #[tokio::test]
    async fn test_conditional_write_rejects_stale_version() {
        let store = store_with(1, 100);

        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        let v1 = first.read_snapshot(1).await.unwrap().version;
        let v2 = second.read_snapshot(1).await.unwrap().version;

        first
            .conditional_write(1, v1, Decimal::new(110, 0), v1 + 1)
            .await
            .unwrap();
        first.commit().unwrap();

        let outcome = second
            .conditional_write(1, v2, Decimal::new(110, 0), v2 + 1)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::VersionMismatch {
                expected: 0,
                actual: 1
            }
        );
    }

    #[tokio::test]
    async fn test_create_account_after_remove_provisions_again() {
        let store = store_with(2, 40);

        store.remove_account(2);
        assert_eq!(store.account(2), None);

        assert!(store.create_account(2));
        assert!(!store.create_account(2));
        assert_eq!(store.accounts(), vec![Account::new(2)]);

        let mut tx = store.begin().unwrap();
        let account = tx.read_for_update(2).await.unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
        tx.write(2, Decimal::new(9, 0)).await.unwrap();
        tx.commit().unwrap();
        assert_eq!(store.account(2).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_lock() {
        let store = store_with(1, 10);
        {
            let mut tx = store.begin().unwrap();
            tx.read_for_update(1).await.unwrap();
            tx.write(1, Decimal::ZERO).await.unwrap();
        }

        let mut tx = store.begin().unwrap();
        let account = tx.read_for_update(1).await.unwrap();
        assert_eq!(account.balance, Decimal::new(10, 0));
    }

    #[tokio::test]
    async fn test_lock_wait_timeout() {
        let store = AsyncMemoryStore::with_config(StoreConfig::with_lock_timeout(
            Duration::from_millis(20),
        ));
        store.create_account(1);

        let mut holder = store.begin().unwrap();
        holder.read_for_update(1).await.unwrap();

        let mut waiter = store.begin().unwrap();
        assert_eq!(
            waiter.read_for_update(1).await,
            Err(StoreError::LockTimeout { account: 1 })
        );
        holder.rollback();
    }

    #[tokio::test]
    async fn test_waiter_sees_holders_commit() {
        let store = store_with(1, 0);
        let mut holder = store.begin().unwrap();
        holder.read_for_update(1).await.unwrap();

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut tx = store.begin().unwrap();
                let account = tx.read_for_update(1).await.unwrap();
                tx.rollback();
                account
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        holder.write(1, Decimal::new(7, 0)).await.unwrap();
        holder.commit().unwrap();

        let seen = waiter.await.unwrap();
        assert_eq!(seen.balance, Decimal::new(7, 0));
        assert_eq!(seen.version, 1);
    }
}
