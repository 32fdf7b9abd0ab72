//! Optimistic balance mutation
//!
//! The balance and version are read without taking a lock. The new balance
//! is then written with a conditional write that only lands if the version
//! is still the one that was read. When another transaction committed in
//! between, the write reports a version mismatch and the whole attempt is
//! rolled back and surfaced as `Conflict`.
//!
//! # Retry
//!
//! Nothing here retries. A `Conflict` is safe to retry because no partial
//! effect was applied: the caller re-runs the whole read-compute-write cycle
//! against a fresh snapshot. See [`RetryPolicy`](super::RetryPolicy) for a
//! bounded caller-side policy.

use super::balance::next_balance;
use super::traits::{AccountStore, StoreTransaction, WriteOutcome};
use crate::types::{AccountId, Action, LedgerError, UpdateOutcome};
use rust_decimal::Decimal;
use tracing::debug;

/// Apply `action` to an account with a version-checked write
///
/// # Returns
///
/// * `Ok(UpdateOutcome)` - The committed balance; `version` is exactly the
///   observed version plus one
/// * `Err(LedgerError)` - The transaction was rolled back, nothing changed
///
/// # Errors
///
/// - `NotFound` if the account does not exist
/// - `InsufficientBalance` if a withdrawal exceeds the observed balance
/// - `Conflict` if another transaction committed after the snapshot read
/// - `Storage` on any store failure
pub fn apply_optimistic<S>(
    store: &S,
    id: AccountId,
    amount: Decimal,
    action: Action,
) -> Result<UpdateOutcome, LedgerError>
where
    S: AccountStore + ?Sized,
{
    let mut tx = store.begin()?;

    match update_versioned(&mut tx, id, amount, action) {
        Ok(outcome) => {
            tx.commit()?;
            debug!(
                account = id,
                %action,
                balance = %outcome.new_balance,
                version = outcome.version,
                "optimistic update committed"
            );
            Ok(outcome)
        }
        Err(e) => {
            tx.rollback();
            debug!(account = id, %action, error = %e, "optimistic update rolled back");
            Err(e)
        }
    }
}

fn update_versioned<T: StoreTransaction>(
    tx: &mut T,
    id: AccountId,
    amount: Decimal,
    action: Action,
) -> Result<UpdateOutcome, LedgerError> {
    let snapshot = tx.read_snapshot(id)?;
    let candidate = next_balance(&snapshot, amount, action)?;
    let new_version = snapshot.version + 1;

    match tx.conditional_write(id, snapshot.version, candidate, new_version)? {
        WriteOutcome::Applied => Ok(UpdateOutcome {
            account_id: id,
            new_balance: candidate,
            version: new_version,
        }),
        WriteOutcome::VersionMismatch { expected, actual } => {
            Err(LedgerError::conflict(id, expected, actual))
        }
        WriteOutcome::RowMissing => Err(LedgerError::storage(format!(
            "conditional update of account {} matched no row",
            id
        ))),
    }
}
