//! Ledger synchronization.
//!
//! Keeps the one ledger transaction of a paid invoice and its balance
//! application in step. Step order is fixed:
//!
//! - materialize: insert transaction, then credit the account. A failed
//!   credit deletes the transaction again.
//! - dematerialize: reverse the credit, then delete the transaction.
//!
//! A crash between steps leaves a transaction whose adjustment journal
//! tells exactly which step is missing.

use chrono::NaiveDate;
use std::sync::Arc;
use visadesk_shared::types::InvoiceId;

use super::balance::BalanceAdjuster;
use super::error::{BillingError, StoreError};
use super::records::{AdjustmentKey, LedgerTransaction};
use super::store::LedgerStore;
use super::types::{CollectionRef, Invoice};

/// Outcome of [`LedgerSynchronizer::materialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialization {
    /// A new transaction was created and credited.
    Created(LedgerTransaction),
    /// The invoice already had a transaction; nothing new was created.
    AlreadyPresent(LedgerTransaction),
}

impl Materialization {
    /// The invoice's transaction.
    #[must_use]
    pub fn transaction(&self) -> &LedgerTransaction {
        match self {
            Self::Created(tx) | Self::AlreadyPresent(tx) => tx,
        }
    }

    /// Whether this call created the transaction.
    #[must_use]
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Outcome of [`LedgerSynchronizer::dematerialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dematerialization {
    /// The transaction was reversed and deleted.
    Removed(LedgerTransaction),
    /// No transaction referenced the invoice.
    NothingToRemove,
}

/// Balance state of a transaction according to the adjustment journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditState {
    /// Credit applied, no reversal.
    Credited,
    /// Credit never applied.
    Missing,
    /// Reversal applied; the transaction should already be gone.
    Reversed,
}

/// Creates and removes the ledger transaction of an invoice.
#[derive(Clone)]
pub struct LedgerSynchronizer {
    ledger: Arc<dyn LedgerStore>,
    balances: BalanceAdjuster,
}

impl LedgerSynchronizer {
    /// Creates a synchronizer.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, balances: BalanceAdjuster) -> Self {
        Self { ledger, balances }
    }

    /// Ensures `invoice` has exactly one credited transaction.
    ///
    /// An existing transaction is never duplicated; its missing credit, if
    /// any, is applied.
    ///
    /// # Errors
    ///
    /// Returns `BalanceUpdateFailure` after rolling the new transaction back,
    /// or a store error.
    pub async fn materialize(
        &self,
        invoice: &Invoice,
        collection: &CollectionRef,
        on: NaiveDate,
    ) -> Result<Materialization, BillingError> {
        if let Some(existing) = self.ledger.find_by_invoice(invoice.id).await? {
            return self.already_present(existing).await;
        }

        let tx = LedgerTransaction::for_invoice(invoice, collection, on);
        match self.ledger.insert(&tx).await {
            Ok(()) => {}
            Err(StoreError::Conflict(reason)) => {
                // Lost a race against another writer for the same invoice.
                return match self.ledger.find_by_invoice(invoice.id).await? {
                    Some(existing) => self.already_present(existing).await,
                    None => Err(StoreError::Conflict(reason).into()),
                };
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            invoice_id = %invoice.id,
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            currency = %tx.amount.currency,
            amount = %tx.amount.amount,
            "Ledger transaction created"
        );

        match self
            .balances
            .apply(
                tx.account_id,
                tx.amount.currency,
                tx.balance_delta(),
                AdjustmentKey::credit(tx.id),
            )
            .await
        {
            Ok(_) => Ok(Materialization::Created(tx)),
            Err(err) => {
                self.compensate(&tx).await;
                Err(err)
            }
        }
    }

    /// Reverses and deletes the invoice's transaction if it books another
    /// amount or account than the payment about to be recorded.
    ///
    /// # Errors
    ///
    /// Returns `BalanceUpdateFailure` when the reversal fails; the
    /// transaction is then left in place.
    pub async fn discard_mismatched(
        &self,
        invoice: &Invoice,
        collection: &CollectionRef,
    ) -> Result<Option<LedgerTransaction>, BillingError> {
        match self.ledger.find_by_invoice(invoice.id).await? {
            Some(tx) if !tx.books(invoice, collection) => {
                tracing::warn!(
                    invoice_id = %invoice.id,
                    transaction_id = %tx.id,
                    stale_amount = %tx.amount.amount,
                    stale_account_id = %tx.account_id,
                    "Discarding stale ledger transaction before payment"
                );
                self.reverse_and_remove(&tx).await?;
                Ok(Some(tx))
            }
            _ => Ok(None),
        }
    }

    async fn already_present(
        &self,
        existing: LedgerTransaction,
    ) -> Result<Materialization, BillingError> {
        tracing::debug!(
            invoice_id = %existing.invoice_id,
            transaction_id = %existing.id,
            "Duplicate ledger transaction refused, invoice already materialized"
        );
        self.ensure_credited(&existing).await?;
        Ok(Materialization::AlreadyPresent(existing))
    }

    /// Deletes a transaction whose credit failed.
    ///
    /// The transaction is kept when the journal shows the credit did land or
    /// cannot be read; the reconciler settles those.
    async fn compensate(&self, tx: &LedgerTransaction) {
        match self.balances.is_applied(AdjustmentKey::credit(tx.id)).await {
            Ok(false) => match self.ledger.delete(tx.id).await {
                Ok(_) => tracing::warn!(
                    invoice_id = %tx.invoice_id,
                    transaction_id = %tx.id,
                    "Balance update failed, ledger transaction rolled back"
                ),
                Err(err) => tracing::error!(
                    invoice_id = %tx.invoice_id,
                    transaction_id = %tx.id,
                    error = %err,
                    "Rollback of ledger transaction failed, left for reconciliation"
                ),
            },
            Ok(true) => tracing::warn!(
                invoice_id = %tx.invoice_id,
                transaction_id = %tx.id,
                "Balance update reported failure but was recorded, keeping transaction"
            ),
            Err(err) => tracing::error!(
                invoice_id = %tx.invoice_id,
                transaction_id = %tx.id,
                error = %err,
                "Cannot read adjustment journal, left for reconciliation"
            ),
        }
    }

    /// Reverses and deletes the invoice's transaction, if any.
    ///
    /// # Errors
    ///
    /// Returns `BalanceUpdateFailure` when the reversal fails; the
    /// transaction is then left in place.
    pub async fn dematerialize(&self, invoice_id: InvoiceId) -> Result<Dematerialization, BillingError> {
        match self.ledger.find_by_invoice(invoice_id).await? {
            Some(tx) => {
                self.reverse_and_remove(&tx).await?;
                Ok(Dematerialization::Removed(tx))
            }
            None => Ok(Dematerialization::NothingToRemove),
        }
    }

    async fn reverse_and_remove(&self, tx: &LedgerTransaction) -> Result<(), BillingError> {
        if self.balances.is_applied(AdjustmentKey::credit(tx.id)).await? {
            self.balances
                .apply(
                    tx.account_id,
                    tx.amount.currency,
                    -tx.balance_delta(),
                    AdjustmentKey::reversal(tx.id),
                )
                .await?;
        }
        self.ledger.delete(tx.id).await?;

        tracing::info!(
            invoice_id = %tx.invoice_id,
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            "Ledger transaction reversed and removed"
        );
        Ok(())
    }

    /// Reads the journal state of `tx`.
    ///
    /// # Errors
    ///
    /// Returns a store error when the journal cannot be read.
    pub async fn credit_state(&self, tx: &LedgerTransaction) -> Result<CreditState, BillingError> {
        if self.balances.is_applied(AdjustmentKey::reversal(tx.id)).await? {
            return Ok(CreditState::Reversed);
        }
        if self.balances.is_applied(AdjustmentKey::credit(tx.id)).await? {
            Ok(CreditState::Credited)
        } else {
            Ok(CreditState::Missing)
        }
    }

    /// Applies the credit of `tx` if it is missing. Returns true when it did.
    ///
    /// # Errors
    ///
    /// Returns `InconsistentState` when `tx` was already reversed, or
    /// `BalanceUpdateFailure`.
    pub async fn ensure_credited(&self, tx: &LedgerTransaction) -> Result<bool, BillingError> {
        match self.credit_state(tx).await? {
            CreditState::Credited => Ok(false),
            CreditState::Reversed => Err(BillingError::InconsistentState {
                invoice_id: tx.invoice_id,
                detail: format!("ledger transaction {} was reversed but still exists", tx.id),
            }),
            CreditState::Missing => {
                self.balances
                    .apply(
                        tx.account_id,
                        tx.amount.currency,
                        tx.balance_delta(),
                        AdjustmentKey::credit(tx.id),
                    )
                    .await?;
                tracing::warn!(
                    invoice_id = %tx.invoice_id,
                    transaction_id = %tx.id,
                    "Applied missing credit for ledger transaction"
                );
                Ok(true)
            }
        }
    }

    /// Deletes a transaction whose invoice was archived, leaving balances alone.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn remove_archived(&self, tx: &LedgerTransaction) -> Result<(), BillingError> {
        self.ledger.delete(tx.id).await?;
        tracing::info!(
            invoice_id = %tx.invoice_id,
            transaction_id = %tx.id,
            "Archived ledger transaction removed from live store"
        );
        Ok(())
    }
}
