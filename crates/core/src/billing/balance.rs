//! Account balance adjustment.
//!
//! Every delta is applied under the account's lock and carries an
//! [`AdjustmentKey`], so replaying the same adjustment is a no-op.

use rust_decimal::Decimal;
use std::sync::Arc;
use visadesk_shared::types::{AccountId, Currency};

use super::error::{BillingError, StoreError};
use super::locks::LockRegistry;
use super::records::{AdjustmentKey, BalanceApplication};
use super::store::AccountStore;

/// Applies signed deltas to account currency buckets.
#[derive(Clone)]
pub struct BalanceAdjuster {
    accounts: Arc<dyn AccountStore>,
    locks: LockRegistry,
    retry_limit: u32,
}

impl BalanceAdjuster {
    /// Creates an adjuster over `accounts`.
    ///
    /// `retry_limit` bounds how often a lost optimistic version check is retried.
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>, locks: LockRegistry, retry_limit: u32) -> Self {
        Self {
            accounts,
            locks,
            retry_limit,
        }
    }

    /// Adds `delta` to the `currency` bucket of `account_id` once per `key`.
    ///
    /// # Errors
    ///
    /// Returns `BalanceUpdateFailure` when the account is gone, the lock
    /// times out, retries are exhausted or the store fails.
    pub async fn apply(
        &self,
        account_id: AccountId,
        currency: Currency,
        delta: Decimal,
        key: AdjustmentKey,
    ) -> Result<BalanceApplication, BillingError> {
        let _guard = self
            .locks
            .acquire(account_id.into_inner())
            .await
            .map_err(|err| BillingError::BalanceUpdateFailure {
                account_id,
                reason: err.to_string(),
            })?;

        let mut attempt = 0;
        loop {
            match self
                .accounts
                .apply_delta(account_id, currency, delta, key)
                .await
            {
                Ok(BalanceApplication::Applied { new_balance }) => {
                    tracing::info!(
                        account_id = %account_id,
                        currency = %currency,
                        delta = %delta,
                        adjustment = %key,
                        new_balance = %new_balance,
                        "Balance adjusted"
                    );
                    return Ok(BalanceApplication::Applied { new_balance });
                }
                Ok(BalanceApplication::AlreadyApplied) => {
                    tracing::debug!(
                        account_id = %account_id,
                        adjustment = %key,
                        "Adjustment already applied, skipping"
                    );
                    return Ok(BalanceApplication::AlreadyApplied);
                }
                Err(StoreError::ConcurrentModification(_)) if attempt < self.retry_limit => {
                    attempt += 1;
                    tracing::debug!(
                        account_id = %account_id,
                        attempt,
                        "Balance version check lost, retrying"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        account_id = %account_id,
                        adjustment = %key,
                        error = %err,
                        "Balance update failed"
                    );
                    return Err(BillingError::BalanceUpdateFailure {
                        account_id,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    /// Whether `key` has been applied.
    ///
    /// # Errors
    ///
    /// Returns a store error when the journal cannot be read.
    pub async fn is_applied(&self, key: AdjustmentKey) -> Result<bool, BillingError> {
        Ok(self.accounts.has_adjustment(key).await?)
    }
}
