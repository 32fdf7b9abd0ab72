//! Ledger Locks Library
//! # Overview
//!
//! This library applies deposits and withdrawals to ledger accounts under
//! concurrency, with two interchangeable strategies for keeping each balance
//! correct:
//!
//! - **Pessimistic**: take an exclusive row lock, read, validate, write,
//!   commit. Concurrent updates of the same account wait their turn.
//! - **Optimistic**: read without a lock, then write only if the account's
//!   version is still the one that was read. A concurrent update makes the
//!   write fail with a conflict instead of blocking.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, UpdateRequest, LedgerError, etc.)
//! - [`core`] - Business logic components:
//!   - [`core::traits`] - The account store contract
//!   - [`core::memory_store`] - In-memory store with row locks and staged writes
//!   - [`core::pessimistic`] / [`core::optimistic`] - The two strategies
//!   - [`core::coordinator`] - Request validation and strategy dispatch
//!   - [`core::retry`] - Caller-side retry policy for conflicts
//!   - `core::async` - tokio counterparts of the store and coordinator
//! - [`io`] - CSV request input and account output
//! - [`runner`] - Concurrent replay of a request file (threads or tokio tasks)
//! - [`cli`] - CLI arguments parsing
//!
//! # Invariants
//!
//! For every account:
//! - the balance never drops below zero
//! - the version counts the committed updates, so it only ever grows
//! - a failed update leaves no trace in the store

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod runner;
pub mod types;

pub use core::{
    AccountStore, AsyncAccountStore, AsyncMemoryStore, AsyncStoreTransaction,
    AsyncUpdateCoordinator, MemoryAccountStore, RetryPolicy, StoreTransaction, UpdateCoordinator,
};
pub use io::write_accounts_csv;
pub use types::{
    Account, AccountId, Action, ErrorKind, LedgerError, LockStrategy, StoreError, UpdateOutcome,
    UpdateRequest,
};
