//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account state and identifiers
//! - `request`: Update requests, results and lock strategies
//! - `error`: Error taxonomy for updates and stores

pub mod account;
pub mod error;
pub mod request;

pub use account::{Account, AccountId};
pub use error::{ErrorKind, LedgerError, StoreError};
pub use request::{Action, LockStrategy, UpdateOutcome, UpdateRequest};
