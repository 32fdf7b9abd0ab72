//! Candidate balance computation
//!
//! Both lock strategies compute the next balance the same way; only the way
//! they protect the read-compute-write cycle differs.

use crate::types::{Account, Action, LedgerError};
use rust_decimal::Decimal;

/// Compute the balance `account` would have after applying `action`
///
/// Uses checked arithmetic so an overflowing deposit is rejected instead of
/// wrapping or panicking.
///
/// # Errors
///
/// Returns an error if:
/// - A withdrawal exceeds the current balance (`InsufficientBalance`)
/// - The arithmetic overflows (`ArithmeticOverflow`)
pub fn next_balance(account: &Account, amount: Decimal, action: Action) -> Result<Decimal, LedgerError> {
    match action {
        Action::Deposit => account
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("deposit", account.id)),
        Action::Withdrawal => {
            if account.balance < amount {
                return Err(LedgerError::insufficient_balance(
                    account.id,
                    account.balance,
                    amount,
                ));
            }
            account
                .balance
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::arithmetic_overflow("withdrawal", account.id))
        }
    }
}
