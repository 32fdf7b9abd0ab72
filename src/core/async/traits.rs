//! Account store contract for tokio tasks
//!
//! Mirrors [`AccountStore`](crate::core::AccountStore) and
//! [`StoreTransaction`](crate::core::StoreTransaction). The operations that may
//! wait on another transaction (the locking read and both writes) are async,
//! so a waiting update parks its task instead of blocking a worker thread.
//! Commit and rollback only publish or discard staged state and never wait.

use crate::core::traits::WriteOutcome;
use crate::types::{Account, AccountId, StoreError};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Durable keyed storage for accounts, driven from async tasks
pub trait AsyncAccountStore: Send + Sync {
    /// Transaction handle type
    type Tx<'a>: AsyncStoreTransaction
    where
        Self: 'a;

    /// Begin a new transaction
    fn begin(&self) -> Result<Self::Tx<'_>, StoreError>;
}

/// A single store transaction owned by one task
///
/// Dropping the transaction, including dropping the future that owns it,
/// must behave like `rollback`.
#[async_trait]
pub trait AsyncStoreTransaction: Send {
    /// Read an account and take its exclusive row lock
    async fn read_for_update(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Read the committed state of an account without locking
    async fn read_snapshot(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Stage a new balance and bump the version by one
    async fn write(&mut self, id: AccountId, new_balance: Decimal)
        -> Result<WriteOutcome, StoreError>;

    /// Stage a write only if the committed version equals `expected_version`
    async fn conditional_write(
        &mut self,
        id: AccountId,
        expected_version: u64,
        new_balance: Decimal,
        new_version: u64,
    ) -> Result<WriteOutcome, StoreError>;

    /// Make every staged write visible and release all row locks
    fn commit(self) -> Result<(), StoreError>;

    /// Discard staged writes and release all row locks
    fn rollback(self);
}
