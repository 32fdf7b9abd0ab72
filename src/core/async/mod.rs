//! Asynchronous implementations of core components
//!
//! This module provides tokio-native counterparts of the store contract, the
//! in-memory store and the update coordinator.
//!
//! # Architecture
//!
//! ```text
//! AsyncUpdateCoordinator
//!     └── Arc<S: AsyncAccountStore>     (AsyncMemoryStore by default)
//!             ├── DashMap<AccountId, row>   (committed state)
//!             └── tokio Mutex per row       (exclusive row lock)
//! ```
//!
//! # Thread Safety
//!
//! All components are designed for safe concurrent access from many tasks:
//! - Updates of different accounts proceed in parallel
//! - Pessimistic updates of the same account wait on the row lock
//! - Optimistic updates of the same account race, and only one commit per
//!   version succeeds

pub mod coordinator;
pub mod store;
pub mod traits;

pub use coordinator::AsyncUpdateCoordinator;
pub use store::{AsyncMemoryStore, AsyncTransaction};
pub use traits::{AsyncAccountStore, AsyncStoreTransaction};
