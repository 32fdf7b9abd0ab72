//! Error types for the ledger
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`]: failures reported by an account store implementation
//! - [`LedgerError`]: the taxonomy returned to callers of the coordinator
//!
//! Every store failure is re-tagged into a `LedgerError` before it leaves the
//! core. [`ErrorKind`] flattens `LedgerError` into the tag a request-handling
//! layer maps onto its own status convention.

use super::account::AccountId;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Flat classification of a [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Request failed shape validation (missing account, non-positive amount)
    InvalidRequest,
    /// Action is neither deposit nor withdrawal
    InvalidAction,
    /// Withdrawal would drive the balance negative
    InsufficientBalance,
    /// Version mismatch at write time (optimistic only)
    Conflict,
    /// Account does not exist
    NotFound,
    /// Underlying store failed
    StorageError,
}

impl ErrorKind {
    /// Whether a caller may retry the same request
    ///
    /// `Conflict` is retried by re-reading and recomputing, `StorageError`
    /// with backoff. Everything else is terminal for the request.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Conflict | ErrorKind::StorageError)
    }

    /// Stable snake_case name, used in logs and summaries
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidAction => "invalid_action",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StorageError => "storage_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for balance updates
///
/// Each variant carries enough context to explain the rejection without
/// access to the store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The request did not name an account
    #[error("Update request is missing an account id")]
    MissingAccountId,

    /// Amount is zero or negative
    #[error("Invalid amount {amount}: amount must be positive")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// Action is neither deposit nor withdrawal
    #[error("Invalid action '{action}', only \"deposit\" and \"withdrawal\" are supported")]
    InvalidAction {
        /// The raw action string
        action: String,
    },

    /// Withdrawal would make the balance negative
    ///
    /// The transaction is rolled back and the account is left unchanged.
    #[error("Insufficient balance on account {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        /// Account ID
        account: AccountId,
        /// Balance observed by the transaction
        balance: Decimal,
        /// Requested withdrawal amount
        requested: Decimal,
    },

    /// The account changed between the snapshot read and the conditional write
    ///
    /// Safe to retry: nothing was applied.
    #[error("Version conflict on account {account}: expected version {expected}, found {actual}")]
    Conflict {
        /// Account ID
        account: AccountId,
        /// Version observed by the snapshot read
        expected: u64,
        /// Version committed at write time
        actual: u64,
    },

    /// Account does not exist
    #[error("Account {account} not found")]
    NotFound {
        /// Account ID
        account: AccountId,
    },

    /// Adding the amount would overflow the balance representation
    #[error("Arithmetic overflow in {action} for account {account}")]
    ArithmeticOverflow {
        /// Action that would overflow
        action: String,
        /// Account ID
        account: AccountId,
    },

    /// The store failed for reasons outside the core's control
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the store failure
        message: String,
    },
}

impl LedgerError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::MissingAccountId
            | LedgerError::InvalidAmount { .. }
            | LedgerError::ArithmeticOverflow { .. } => ErrorKind::InvalidRequest,
            LedgerError::InvalidAction { .. } => ErrorKind::InvalidAction,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::Conflict { .. } => ErrorKind::Conflict,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Storage { .. } => ErrorKind::StorageError,
        }
    }

    /// Shorthand for `self.kind().is_retryable()`
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Create an InvalidAction error
    pub fn invalid_action(action: &str) -> Self {
        LedgerError::InvalidAction {
            action: action.to_string(),
        }
    }

    /// Create an InsufficientBalance error
    pub fn insufficient_balance(account: AccountId, balance: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientBalance {
            account,
            balance,
            requested,
        }
    }

    /// Create a Conflict error
    pub fn conflict(account: AccountId, expected: u64, actual: u64) -> Self {
        LedgerError::Conflict {
            account,
            expected,
            actual,
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(action: &str, account: AccountId) -> Self {
        LedgerError::ArithmeticOverflow {
            action: action.to_string(),
            account,
        }
    }

    /// Create a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        LedgerError::Storage {
            message: message.into(),
        }
    }
}

/// Errors reported by an account store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No row exists for the account
    #[error("account {account} does not exist")]
    NotFound {
        /// Account ID
        account: AccountId,
    },

    /// Waiting for another transaction's row lock exceeded the configured timeout
    #[error("timed out waiting for the row lock on account {account}")]
    LockTimeout {
        /// Account ID
        account: AccountId,
    },

    /// Any other backend failure (I/O, connectivity, aborted transaction)
    #[error("{message}")]
    Backend {
        /// Description of the failure
        message: String,
    },
}

impl StoreError {
    /// Create a Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }
}

// Conversion from StoreError to LedgerError
impl From<StoreError> for LedgerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { account } => LedgerError::NotFound { account },
            other => LedgerError::Storage {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::missing_account(LedgerError::MissingAccountId, "Update request is missing an account id")]
    #[case::invalid_amount(
        LedgerError::InvalidAmount { amount: Decimal::new(-5, 0) },
        "Invalid amount -5: amount must be positive"
    )]
    #[case::invalid_action(
        LedgerError::invalid_action("transfer"),
        "Invalid action 'transfer', only \"deposit\" and \"withdrawal\" are supported"
    )]
    #[case::insufficient_balance(
        LedgerError::insufficient_balance(1, Decimal::new(100, 0), Decimal::new(150, 0)),
        "Insufficient balance on account 1: balance 100, requested 150"
    )]
    #[case::conflict(
        LedgerError::conflict(3, 1, 2),
        "Version conflict on account 3: expected version 1, found 2"
    )]
    #[case::not_found(LedgerError::NotFound { account: 9 }, "Account 9 not found")]
    #[case::storage(LedgerError::storage("disk full"), "Storage error: disk full")]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::missing_account(LedgerError::MissingAccountId, ErrorKind::InvalidRequest, false)]
    #[case::overflow(LedgerError::arithmetic_overflow("deposit", 1), ErrorKind::InvalidRequest, false)]
    #[case::invalid_action(LedgerError::invalid_action("x"), ErrorKind::InvalidAction, false)]
    #[case::insufficient(
        LedgerError::insufficient_balance(1, Decimal::ZERO, Decimal::ONE),
        ErrorKind::InsufficientBalance,
        false
    )]
    #[case::conflict(LedgerError::conflict(1, 0, 1), ErrorKind::Conflict, true)]
    #[case::not_found(LedgerError::NotFound { account: 1 }, ErrorKind::NotFound, false)]
    #[case::storage(LedgerError::storage("boom"), ErrorKind::StorageError, true)]
    fn test_error_kind_and_retryability(
        #[case] error: LedgerError,
        #[case] kind: ErrorKind,
        #[case] retryable: bool,
    ) {
        assert_eq!(error.kind(), kind);
        assert_eq!(error.is_retryable(), retryable);
    }

    #[rstest]
    #[case::not_found(StoreError::NotFound { account: 4 }, LedgerError::NotFound { account: 4 })]
    #[case::lock_timeout(
        StoreError::LockTimeout { account: 4 },
        LedgerError::storage("timed out waiting for the row lock on account 4")
    )]
    #[case::backend(StoreError::backend("connection reset"), LedgerError::storage("connection reset"))]
    fn test_store_error_conversion(#[case] error: StoreError, #[case] expected: LedgerError) {
        assert_eq!(LedgerError::from(error), expected);
    }
}
