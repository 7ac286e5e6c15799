//! Execution of invoice status transitions.
//!
//! Callers hold the invoice lock. Ledger work always happens before the
//! invoice write, and the status field lands in the last write, so an
//! interrupted transition leaves the invoice in its old status with ledger
//! work that reconciliation can finish.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use visadesk_shared::types::LedgerTransactionId;

use super::error::{BillingError, StoreError};
use super::ledger::{Dematerialization, LedgerSynchronizer, Materialization};
use super::status::{InvoiceStatus, InvoiceStatusMachine, LedgerEffect};
use super::store::{AccountStore, InvoiceStore};
use super::types::{CollectionDraft, CollectionRef, Invoice};

/// What a transition did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "transaction_id", rename_all = "snake_case")]
pub enum LedgerChange {
    /// Ledger untouched.
    None,
    /// A transaction was created and credited.
    Created(LedgerTransactionId),
    /// The existing transaction was kept.
    AlreadyPresent(LedgerTransactionId),
    /// The transaction was reversed and removed.
    Removed(LedgerTransactionId),
}

impl From<&Materialization> for LedgerChange {
    fn from(value: &Materialization) -> Self {
        match value {
            Materialization::Created(tx) => Self::Created(tx.id),
            Materialization::AlreadyPresent(tx) => Self::AlreadyPresent(tx.id),
        }
    }
}

impl From<&Dematerialization> for LedgerChange {
    fn from(value: &Dematerialization) -> Self {
        match value {
            Dematerialization::Removed(tx) => Self::Removed(tx.id),
            Dematerialization::NothingToRemove => Self::None,
        }
    }
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    /// Status before.
    pub from: InvoiceStatus,
    /// Status after.
    pub to: InvoiceStatus,
    /// Ledger side effect.
    pub ledger: LedgerChange,
    /// The invoice as stored afterwards.
    pub invoice: Invoice,
}

/// Carries out transitions planned by [`InvoiceStatusMachine`].
#[derive(Clone)]
pub struct TransitionExecutor {
    invoices: Arc<dyn InvoiceStore>,
    accounts: Arc<dyn AccountStore>,
    synchronizer: LedgerSynchronizer,
}

impl TransitionExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        accounts: Arc<dyn AccountStore>,
        synchronizer: LedgerSynchronizer,
    ) -> Self {
        Self {
            invoices,
            accounts,
            synchronizer,
        }
    }

    /// The ledger synchronizer used by this executor.
    #[must_use]
    pub fn synchronizer(&self) -> &LedgerSynchronizer {
        &self.synchronizer
    }

    /// Moves `current` to `target`.
    ///
    /// `collection` is only read for moves into `paid`. An unfinished undo
    /// of `paid` can only be resumed, by requesting its own target again.
    ///
    /// # Errors
    ///
    /// Validation and precondition errors leave every store untouched.
    /// `BalanceUpdateFailure` and `LockTimeout` are retryable.
    pub async fn execute(
        &self,
        current: Invoice,
        target: InvoiceStatus,
        collection: CollectionDraft,
        today: NaiveDate,
    ) -> Result<TransitionOutcome, BillingError> {
        if let Some(pending) = current.pending_status {
            if pending != target {
                return Err(BillingError::TransitionPending { pending });
            }
            tracing::info!(invoice_id = %current.id, target = %target, "Resuming unfinished transition");
            return self.finish_undo(current).await;
        }

        let plan = InvoiceStatusMachine::plan(current.status, target)?;
        match plan.ledger {
            LedgerEffect::Materialize => self.mark_paid(current, collection, today).await,
            LedgerEffect::Dematerialize => self.undo_paid(current, target).await,
            LedgerEffect::None => self.move_unpaid(current, target).await,
        }
    }

    async fn mark_paid(
        &self,
        current: Invoice,
        draft: CollectionDraft,
        today: NaiveDate,
    ) -> Result<TransitionOutcome, BillingError> {
        let collection = match (current.status, current.collection) {
            // Re-affirming a paid invoice may omit the reference.
            (InvoiceStatus::Paid, Some(stored)) if draft.is_empty() => stored,
            _ => draft.complete()?,
        };
        self.check_account(&collection).await?;

        let from = current.status;
        if from != InvoiceStatus::Paid {
            // A leftover from a failed payment must not stand in for this one.
            self.synchronizer
                .discard_mismatched(&current, &collection)
                .await?;
        }
        let materialized = self
            .synchronizer
            .materialize(&current, &collection, today)
            .await?;
        let tx = materialized.transaction();

        let mut invoice = current;
        invoice.collection = Some(tx.collection());
        invoice.ledger_transaction_id = Some(tx.id);
        invoice.pending_status = None;
        invoice.status = InvoiceStatus::Paid;
        self.write(&invoice).await?;

        tracing::info!(
            invoice_id = %invoice.id,
            from = %from,
            transaction_id = %tx.id,
            created = materialized.was_created(),
            "Invoice marked as paid"
        );

        Ok(TransitionOutcome {
            from,
            to: InvoiceStatus::Paid,
            ledger: LedgerChange::from(&materialized),
            invoice,
        })
    }

    async fn check_account(&self, collection: &CollectionRef) -> Result<(), BillingError> {
        let account = self
            .accounts
            .get(collection.account_id)
            .await?
            .ok_or(BillingError::UnknownCollectionAccount(collection.account_id))?;
        if account.kind != collection.account_kind {
            return Err(BillingError::CollectionAccountKindMismatch {
                account_id: account.id,
                expected: collection.account_kind,
                actual: account.kind,
            });
        }
        Ok(())
    }

    async fn undo_paid(
        &self,
        current: Invoice,
        target: InvoiceStatus,
    ) -> Result<TransitionOutcome, BillingError> {
        let mut marked = current;
        marked.pending_status = Some(target);
        self.write(&marked).await?;
        self.finish_undo(marked).await
    }

    /// Completes an undo of `paid` whose target is recorded in `pending_status`.
    ///
    /// # Errors
    ///
    /// On failure the marker stays and the call can be repeated.
    pub async fn finish_undo(&self, invoice: Invoice) -> Result<TransitionOutcome, BillingError> {
        let Some(target) = invoice.pending_status else {
            return Err(BillingError::InconsistentState {
                invoice_id: invoice.id,
                detail: "no unfinished transition to complete".to_string(),
            });
        };
        let from = invoice.status;

        let removed = self.synchronizer.dematerialize(invoice.id).await?;

        let mut invoice = invoice;
        invoice.status = target;
        invoice.pending_status = None;
        invoice.collection = None;
        invoice.ledger_transaction_id = None;
        self.write(&invoice).await?;

        tracing::info!(invoice_id = %invoice.id, from = %from, to = %target, "Payment undone");

        Ok(TransitionOutcome {
            from,
            to: target,
            ledger: LedgerChange::from(&removed),
            invoice,
        })
    }

    async fn move_unpaid(
        &self,
        current: Invoice,
        target: InvoiceStatus,
    ) -> Result<TransitionOutcome, BillingError> {
        let from = current.status;
        let stale = current.collection.is_some() || current.ledger_transaction_id.is_some();

        if from == target && !stale {
            return Ok(TransitionOutcome {
                from,
                to: target,
                ledger: LedgerChange::None,
                invoice: current,
            });
        }

        let removed = if stale {
            self.synchronizer.dematerialize(current.id).await?
        } else {
            Dematerialization::NothingToRemove
        };

        let mut invoice = current;
        invoice.status = target;
        invoice.collection = None;
        invoice.ledger_transaction_id = None;
        self.write(&invoice).await?;

        tracing::info!(invoice_id = %invoice.id, from = %from, to = %target, "Invoice status changed");

        Ok(TransitionOutcome {
            from,
            to: target,
            ledger: LedgerChange::from(&removed),
            invoice,
        })
    }

    /// Writes an invoice, mapping a vanished row to `InvoiceNotFound`.
    pub(crate) async fn write(&self, invoice: &Invoice) -> Result<(), BillingError> {
        match self.invoices.update(invoice).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) => Err(BillingError::InvoiceNotFound(invoice.id)),
            Err(err) => Err(err.into()),
        }
    }
}
