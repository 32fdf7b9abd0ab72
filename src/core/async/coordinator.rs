//! Update coordination on tokio tasks
//!
//! `AsyncUpdateCoordinator` runs the same two strategies as
//! [`UpdateCoordinator`](crate::core::UpdateCoordinator) against any
//! [`AsyncAccountStore`], by default the [`AsyncMemoryStore`]. A pessimistic
//! update waiting for a row lock parks its task, leaving the worker thread
//! free for updates of other accounts.
//!
//! # Cancellation
//!
//! The transaction is owned by the future returned from `apply`. Dropping
//! that future before it completes drops the transaction, which releases its
//! row locks and discards its staged write.

use super::store::AsyncMemoryStore;
use super::traits::{AsyncAccountStore, AsyncStoreTransaction};
use crate::core::balance::next_balance;
use crate::core::coordinator::validate;
use crate::core::retry::{RetryOutcome, RetryPolicy};
use crate::core::traits::WriteOutcome;
use crate::types::{AccountId, Action, LedgerError, LockStrategy, UpdateOutcome, UpdateRequest};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Entry point for balance updates from async tasks
///
/// Cheap to clone; clones share the same store.
pub struct AsyncUpdateCoordinator<S: AsyncAccountStore = AsyncMemoryStore> {
    store: Arc<S>,
}

impl<S: AsyncAccountStore> Clone for AsyncUpdateCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AsyncAccountStore> AsyncUpdateCoordinator<S> {
    /// Create a coordinator over a caller-owned store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate `request` and apply it with `strategy`
    pub async fn apply(
        &self,
        request: &UpdateRequest,
        strategy: LockStrategy,
    ) -> Result<UpdateOutcome, LedgerError> {
        let update = validate(request)?;

        let result = match strategy {
            LockStrategy::Pessimistic => {
                self.apply_pessimistic(update.account_id, update.amount, update.action)
                    .await
            }
            LockStrategy::Optimistic => {
                self.apply_optimistic(update.account_id, update.amount, update.action)
                    .await
            }
        };

        if let Err(e) = &result {
            debug!(
                account = update.account_id,
                %strategy,
                kind = %e.kind(),
                "update rejected"
            );
        }
        result
    }

    /// Apply `request`, retrying retryable failures according to `policy`
    pub async fn apply_with_retry(
        &self,
        request: &UpdateRequest,
        strategy: LockStrategy,
        policy: &RetryPolicy,
    ) -> RetryOutcome {
        policy
            .run_async(move || self.apply(request, strategy))
            .await
    }

    /// Exclusive row lock for the whole transaction
    pub async fn apply_pessimistic(
        &self,
        id: AccountId,
        amount: Decimal,
        action: Action,
    ) -> Result<UpdateOutcome, LedgerError> {
        let mut tx = self.store.begin()?;

        match update_locked(&mut tx, id, amount, action).await {
            Ok(outcome) => {
                tx.commit()?;
                debug!(account = id, %action, version = outcome.version, "pessimistic update committed");
                Ok(outcome)
            }
            Err(e) => {
                tx.rollback();
                debug!(account = id, %action, error = %e, "pessimistic update rolled back");
                Err(e)
            }
        }
    }

    /// Snapshot read followed by a version-checked write
    pub async fn apply_optimistic(
        &self,
        id: AccountId,
        amount: Decimal,
        action: Action,
    ) -> Result<UpdateOutcome, LedgerError> {
        let mut tx = self.store.begin()?;

        match update_versioned(&mut tx, id, amount, action).await {
            Ok(outcome) => {
                tx.commit()?;
                debug!(account = id, %action, version = outcome.version, "optimistic update committed");
                Ok(outcome)
            }
            Err(e) => {
                tx.rollback();
                debug!(account = id, %action, error = %e, "optimistic update rolled back");
                Err(e)
            }
        }
    }
}

async fn update_locked<T: AsyncStoreTransaction>(
    tx: &mut T,
    id: AccountId,
    amount: Decimal,
    action: Action,
) -> Result<UpdateOutcome, LedgerError> {
    let account = tx.read_for_update(id).await?;
    let candidate = next_balance(&account, amount, action)?;

    match tx.write(id, candidate).await? {
        WriteOutcome::Applied => Ok(UpdateOutcome {
            account_id: id,
            new_balance: candidate,
            version: account.version + 1,
        }),
        WriteOutcome::RowMissing => Err(LedgerError::storage(format!(
            "update of account {} matched no row although it was locked",
            id
        ))),
        WriteOutcome::VersionMismatch { expected, actual } => Err(LedgerError::storage(format!(
            "locked row of account {} changed underneath the lock (version {} -> {})",
            id, expected, actual
        ))),
    }
}

async fn update_versioned<T: AsyncStoreTransaction>(
    tx: &mut T,
    id: AccountId,
    amount: Decimal,
    action: Action,
) -> Result<UpdateOutcome, LedgerError> {
    let snapshot = tx.read_snapshot(id).await?;
    let candidate = next_balance(&snapshot, amount, action)?;
    let new_version = snapshot.version + 1;

    match tx
        .conditional_write(id, snapshot.version, candidate, new_version)
        .await?
    {
        WriteOutcome::Applied => Ok(UpdateOutcome {
            account_id: id,
            new_balance: candidate,
            version: new_version,
        }),
        WriteOutcome::VersionMismatch { expected, actual } => {
            Err(LedgerError::conflict(id, expected, actual))
        }
        WriteOutcome::RowMissing => Err(LedgerError::storage(format!(
            "conditional update of account {} matched no row",
            id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory_store::StoreOp;
    use crate::types::{Account, ErrorKind};
    use std::time::Duration;

    fn coordinator_with(balance: i64) -> AsyncUpdateCoordinator {
        let store = AsyncMemoryStore::new();
        store.seed(Account::with_balance(1, Decimal::new(balance, 0)));
        AsyncUpdateCoordinator::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_scenario_withdrawals() {
        for strategy in [LockStrategy::Pessimistic, LockStrategy::Optimistic] {
            let coordinator = coordinator_with(100);

            let err = coordinator
                .apply(&UpdateRequest::withdrawal(1, Decimal::new(150, 0)), strategy)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InsufficientBalance);

            let outcome = coordinator
                .apply(&UpdateRequest::withdrawal(1, Decimal::new(40, 0)), strategy)
                .await
                .unwrap();
            assert_eq!(outcome.new_balance, Decimal::new(60, 0));
            assert_eq!(outcome.version, 1);
        }
    }

    #[tokio::test]
    async fn test_invalid_action_leaves_store_untouched() {
        let coordinator = coordinator_with(5);
        let request = UpdateRequest {
            account_id: Some(1),
            amount: Decimal::ONE,
            action: "borrow".to_string(),
        };

        let err = coordinator
            .apply(&request, LockStrategy::Pessimistic)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidAction);
        assert_eq!(coordinator.store().commit_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_is_storage_error() {
        let coordinator = coordinator_with(5);
        coordinator.store().fail_next(StoreOp::Commit);

        let err = coordinator
            .apply(&UpdateRequest::deposit(1, Decimal::ONE), LockStrategy::Optimistic)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StorageError);
        assert_eq!(coordinator.store().account(1).unwrap().balance, Decimal::new(5, 0));
    }

    #[tokio::test]
    async fn test_abandoned_update_rolls_back() {
        let coordinator = coordinator_with(5);

        // Hold the row so the pessimistic update below has to wait
        let mut holder = coordinator.store().begin().unwrap();
        holder.read_for_update(1).await.unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            coordinator.apply(&UpdateRequest::deposit(1, Decimal::ONE), LockStrategy::Pessimistic),
        )
        .await;
        assert!(abandoned.is_err());
        holder.rollback();

        let account = coordinator.store().account(1).unwrap();
        assert_eq!(account, Account::with_balance(1, Decimal::new(5, 0)));

        // Nothing is left locked
        coordinator
            .apply(&UpdateRequest::deposit(1, Decimal::ONE), LockStrategy::Pessimistic)
            .await
            .unwrap();
    }
}
