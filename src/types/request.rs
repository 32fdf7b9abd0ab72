//! Update request types
//!
//! This module defines the ephemeral request/result pair exchanged with the
//! update coordinator, and the two lock strategies it can dispatch to.

use super::account::AccountId;
use super::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Balance mutation requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Credit the amount to the account
    Deposit,

    /// Debit the amount from the account
    ///
    /// Rejected with `InsufficientBalance` if the balance would go negative.
    Withdrawal,
}

impl Action {
    /// Lowercase name as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Deposit => "deposit",
            Action::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deposit" => Ok(Action::Deposit),
            "withdrawal" => Ok(Action::Withdrawal),
            _ => Err(LedgerError::invalid_action(s)),
        }
    }
}

/// Concurrency-control strategy used to apply an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    /// Exclusive row lock held for the whole transaction
    Pessimistic,

    /// Non-locking read, version-checked conditional write
    Optimistic,
}

impl fmt::Display for LockStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStrategy::Pessimistic => f.write_str("pessimistic"),
            LockStrategy::Optimistic => f.write_str("optimistic"),
        }
    }
}

/// Update request as handed over by the request-handling layer
///
/// The action is kept as the raw string the caller sent; the coordinator
/// parses it so that an unknown action is reported as `InvalidAction`
/// rather than being lost at deserialization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Target account, `None` when the caller omitted it
    pub account_id: Option<AccountId>,

    /// Quantity to deposit or withdraw (must be positive)
    pub amount: Decimal,

    /// Raw action name
    pub action: String,
}

impl UpdateRequest {
    /// Create a request for a known account and action
    pub fn new(account_id: AccountId, amount: Decimal, action: Action) -> Self {
        UpdateRequest {
            account_id: Some(account_id),
            amount,
            action: action.as_str().to_string(),
        }
    }

    /// Shorthand for a deposit request
    pub fn deposit(account_id: AccountId, amount: Decimal) -> Self {
        Self::new(account_id, amount, Action::Deposit)
    }

    /// Shorthand for a withdrawal request
    pub fn withdrawal(account_id: AccountId, amount: Decimal) -> Self {
        Self::new(account_id, amount, Action::Withdrawal)
    }
}

/// Successful result of an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    /// The account that was updated
    pub account_id: AccountId,

    /// Balance after the committed update
    pub new_balance: Decimal,

    /// Version after the committed update
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case::deposit("deposit", Action::Deposit)]
    #[case::withdrawal("withdrawal", Action::Withdrawal)]
    #[case::uppercase("DEPOSIT", Action::Deposit)]
    #[case::padded("  withdrawal ", Action::Withdrawal)]
    fn test_action_parsing(#[case] input: &str, #[case] expected: Action) {
        assert_eq!(input.parse::<Action>().unwrap(), expected);
    }

    #[rstest]
    #[case::transfer("transfer")]
    #[case::empty("")]
    #[case::dispute("dispute")]
    fn test_action_parsing_rejects_unknown(#[case] input: &str) {
        let err = input.parse::<Action>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAction);
    }

    #[test]
    fn test_request_constructors_use_wire_names() {
        let request = UpdateRequest::withdrawal(7, Decimal::new(40, 0));
        assert_eq!(request.account_id, Some(7));
        assert_eq!(request.action, "withdrawal");
        assert_eq!(request.action.parse::<Action>().unwrap(), Action::Withdrawal);
    }
}
