//! Update coordination
//!
//! This module provides the `UpdateCoordinator`, the single entry point for
//! balance updates. It is responsible for:
//! - Validating the request shape before any transaction is opened
//! - Dispatching to the pessimistic or optimistic strategy
//! - Returning every strategy error unchanged, already tagged with a
//!   [`LedgerError`] variant
//!
//! The coordinator holds no state of its own besides the store handle, which
//! is owned by the caller and shared through an `Arc`.

use super::optimistic::apply_optimistic;
use super::pessimistic::apply_pessimistic;
use super::retry::{RetryOutcome, RetryPolicy};
use super::traits::AccountStore;
use crate::types::{AccountId, Action, LedgerError, LockStrategy, UpdateOutcome, UpdateRequest};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Validated form of an [`UpdateRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedUpdate {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub action: Action,
}

/// Check the request shape
///
/// # Errors
///
/// - `MissingAccountId` if no account was named
/// - `InvalidAmount` if the amount is zero or negative
/// - `InvalidAction` if the action is neither deposit nor withdrawal
pub fn validate(request: &UpdateRequest) -> Result<ValidatedUpdate, LedgerError> {
    let account_id = request.account_id.ok_or(LedgerError::MissingAccountId)?;

    if request.amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount {
            amount: request.amount,
        });
    }

    let action = request.action.parse::<Action>()?;

    Ok(ValidatedUpdate {
        account_id,
        amount: request.amount,
        action,
    })
}

/// Entry point for balance updates over a synchronous store
pub struct UpdateCoordinator<S: AccountStore> {
    store: Arc<S>,
}

impl<S: AccountStore> Clone for UpdateCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AccountStore> UpdateCoordinator<S> {
    /// Create a coordinator over a caller-owned store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate `request` and apply it with `strategy`
    ///
    /// Runs on the calling thread. Under the pessimistic strategy this may
    /// block while another transaction holds the account's row lock.
    pub fn apply(
        &self,
        request: &UpdateRequest,
        strategy: LockStrategy,
    ) -> Result<UpdateOutcome, LedgerError> {
        let update = validate(request)?;

        let result = match strategy {
            LockStrategy::Pessimistic => apply_pessimistic(
                self.store.as_ref(),
                update.account_id,
                update.amount,
                update.action,
            ),
            LockStrategy::Optimistic => apply_optimistic(
                self.store.as_ref(),
                update.account_id,
                update.amount,
                update.action,
            ),
        };

        if let Err(e) = &result {
            debug!(
                account = update.account_id,
                %strategy,
                kind = %e.kind(),
                "update rejected"
            );
        }
        result
    }

    /// Apply `request`, retrying retryable failures according to `policy`
    ///
    /// Validation failures are never retried.
    pub fn apply_with_retry(
        &self,
        request: &UpdateRequest,
        strategy: LockStrategy,
        policy: &RetryPolicy,
    ) -> RetryOutcome {
        policy.run(|| self.apply(request, strategy))
    }
}
