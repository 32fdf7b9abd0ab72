//! Core business logic module
//!
//! This module contains the balance update machinery:
//! - `traits` - The account store contract
//! - `memory_store` - In-memory store with per-row locks
//! - `balance` - Candidate balance computation
//! - `pessimistic` - Row-locking update strategy
//! - `optimistic` - Version-checked update strategy
//! - `coordinator` - Validation and dispatch
//! - `retry` - Caller-side retry policy
//! - `async` - Tokio-native store contract, store and coordinator

pub mod r#async;
pub mod balance;
pub mod coordinator;
pub mod memory_store;
pub mod optimistic;
pub mod pessimistic;
pub mod retry;
pub mod traits;

pub use coordinator::{validate, UpdateCoordinator, ValidatedUpdate};
pub use memory_store::{MemoryAccountStore, MemoryTransaction, StoreConfig, StoreOp};
pub use optimistic::apply_optimistic;
pub use pessimistic::apply_pessimistic;
pub use r#async::{
    AsyncAccountStore, AsyncMemoryStore, AsyncStoreTransaction, AsyncUpdateCoordinator,
};
pub use retry::{RetryOutcome, RetryPolicy};
pub use traits::{AccountStore, StoreTransaction, WriteOutcome};
