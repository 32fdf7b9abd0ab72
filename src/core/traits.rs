//! Account store contract
//!
//! The balance mutators never talk to a concrete storage engine. They need
//! exactly the primitives below: a transactional envelope, a row-locking
//! read, a non-locking snapshot read, and writes that are staged inside the
//! transaction until commit. Any engine exposing those (a relational
//! database with `SELECT ... FOR UPDATE`, a key-value store with conditional
//! put, or the in-memory [`MemoryAccountStore`](super::MemoryAccountStore))
//! can back the coordinator.

use crate::types::{Account, AccountId, StoreError};
use rust_decimal::Decimal;

/// Result of a write inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write is staged and will land on commit
    Applied,

    /// The committed version no longer equals the expected one
    VersionMismatch {
        /// Version the writer observed
        expected: u64,
        /// Version actually committed
        actual: u64,
    },

    /// The row vanished between the read and the write
    RowMissing,
}

/// Durable keyed storage for accounts
///
/// Implementations are shared between concurrent callers, so `begin` takes
/// `&self` and every transaction borrows the store for its lifetime.
pub trait AccountStore: Send + Sync {
    /// Transaction handle type
    type Tx<'a>: StoreTransaction
    where
        Self: 'a;

    /// Begin a new transaction
    fn begin(&self) -> Result<Self::Tx<'_>, StoreError>;
}

/// A single store transaction
///
/// Dropping a transaction that was neither committed nor rolled back must
/// behave like `rollback`: staged writes are discarded and row locks released.
pub trait StoreTransaction {
    /// Read an account and take its exclusive row lock
    ///
    /// Blocks while another transaction holds the lock. The lock is held
    /// until this transaction commits or rolls back.
    fn read_for_update(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Read the committed state of an account without locking
    ///
    /// May be stale by the time the caller acts on it.
    fn read_snapshot(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Stage a new balance and bump the version by one
    ///
    /// Takes the row lock if this transaction does not hold it yet.
    fn write(&mut self, id: AccountId, new_balance: Decimal) -> Result<WriteOutcome, StoreError>;

    /// Stage a write only if the committed version equals `expected_version`
    ///
    /// The version check happens with the row lock held, so it is atomic
    /// with respect to every other writer.
    fn conditional_write(
        &mut self,
        id: AccountId,
        expected_version: u64,
        new_balance: Decimal,
        new_version: u64,
    ) -> Result<WriteOutcome, StoreError>;

    /// Make every staged write visible and release all row locks
    fn commit(self) -> Result<(), StoreError>;

    /// Discard staged writes and release all row locks
    ///
    /// Always safe to call after a failure.
    fn rollback(self);
}
