//! Account-related types for the ledger
//!
//! An [`Account`] is the unit of concurrency control: one row, one balance,
//! one version counter.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account identifier
///
/// Stable and immutable once the account has been provisioned.
pub type AccountId = u64;

/// Ledger account state
///
/// Represents the committed state of a single account row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The account ID
    pub id: AccountId,

    /// Current balance
    ///
    /// Never negative after a committed update. Withdrawals that would
    /// drive it below zero are rejected before anything is written.
    pub balance: Decimal,

    /// Version counter
    ///
    /// Incremented by exactly one for every committed update, whichever
    /// lock strategy performed it. The optimistic strategy uses it as the
    /// precondition of its conditional write.
    pub version: u64,
}

impl Account {
    /// Create a freshly provisioned account
    ///
    /// # Returns
    ///
    /// A new Account with:
    /// - balance = 0
    /// - version = 0
    pub fn new(id: AccountId) -> Self {
        Account {
            id,
            balance: Decimal::ZERO,
            version: 0,
        }
    }

    /// Create an account with an opening balance, still at version 0
    pub fn with_balance(id: AccountId, balance: Decimal) -> Self {
        Account {
            id,
            balance,
            version: 0,
        }
    }
}
