//! Pessimistic balance mutation
//!
//! The account row is locked by `read_for_update` before the balance is
//! read, and stays locked until the transaction ends. Every update to the
//! same account is therefore applied strictly one after another, in lock
//! acquisition order; updates to other accounts proceed in parallel.

use super::balance::next_balance;
use super::traits::{AccountStore, StoreTransaction, WriteOutcome};
use crate::types::{AccountId, Action, LedgerError, UpdateOutcome};
use rust_decimal::Decimal;
use tracing::debug;

/// Apply `action` to an account under an exclusive row lock
///
/// # Arguments
///
/// * `store` - The account store
/// * `id` - Account to update
/// * `amount` - Positive quantity to deposit or withdraw
/// * `action` - Deposit or withdrawal
///
/// # Returns
///
/// * `Ok(UpdateOutcome)` - The committed balance and version
/// * `Err(LedgerError)` - The transaction was rolled back, nothing changed
///
/// # Errors
///
/// - `NotFound` if the account does not exist
/// - `InsufficientBalance` if a withdrawal exceeds the balance
/// - `Storage` on any store failure, including a write that no longer
///   matches the locked row
pub fn apply_pessimistic<S>(
    store: &S,
    id: AccountId,
    amount: Decimal,
    action: Action,
) -> Result<UpdateOutcome, LedgerError>
where
    S: AccountStore + ?Sized,
{
    let mut tx = store.begin()?;

    match update_locked(&mut tx, id, amount, action) {
        Ok(outcome) => {
            tx.commit()?;
            debug!(
                account = id,
                %action,
                balance = %outcome.new_balance,
                version = outcome.version,
                "pessimistic update committed"
            );
            Ok(outcome)
        }
        Err(e) => {
            tx.rollback();
            debug!(account = id, %action, error = %e, "pessimistic update rolled back");
            Err(e)
        }
    }
}

fn update_locked<T: StoreTransaction>(
    tx: &mut T,
    id: AccountId,
    amount: Decimal,
    action: Action,
) -> Result<UpdateOutcome, LedgerError> {
    // Serialization point: blocks while another transaction holds the row
    let account = tx.read_for_update(id)?;
    let candidate = next_balance(&account, amount, action)?;

    match tx.write(id, candidate)? {
        WriteOutcome::Applied => Ok(UpdateOutcome {
            account_id: id,
            new_balance: candidate,
            version: account.version + 1,
        }),
        WriteOutcome::RowMissing => Err(LedgerError::storage(format!(
            "update of account {} matched no row although it was locked",
            id
        ))),
        WriteOutcome::VersionMismatch { expected, actual } => Err(LedgerError::storage(format!(
            "locked row of account {} changed underneath the lock (version {} -> {})",
            id, expected, actual
        ))),
    }
}
