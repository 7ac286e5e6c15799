//! Startup reconciliation sweep.
//!
//! Finds invoices whose status, collection reference, ledger transaction
//! and balance journal disagree, and repairs them where the fix is
//! unambiguous. Anything else is reported for an operator. Running the
//! sweep on a consistent store changes nothing.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use visadesk_shared::types::{InvoiceId, LedgerTransactionId};

use super::error::BillingError;
use super::ledger::CreditState;
use super::locks::LockRegistry;
use super::records::LedgerTransaction;
use super::status::InvoiceStatus;
use super::store::{ArchiveStore, InvoiceStore, LedgerStore};
use super::transition::TransitionExecutor;
use super::types::Invoice;

/// An automatic repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    /// Finished an interrupted undo of `paid`.
    CompletedReversal,
    /// Created the missing transaction of a paid invoice.
    Rematerialized,
    /// Applied the missing credit of a paid invoice's transaction.
    CreditedBalance,
    /// Copied the collection reference back from the transaction.
    RestoredCollection,
    /// Pointed the invoice at its actual transaction.
    RelinkedTransaction,
    /// Removed ledger state left on an unpaid invoice.
    ClearedStaleLedger,
    /// Removed the live transaction of an archived invoice.
    FinishedArchival,
}

/// A repair the sweep carried out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Correction {
    /// Repaired invoice.
    pub invoice_id: InvoiceId,
    /// What was done.
    pub action: RepairAction,
}

/// Why an inconsistency needs an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualReason {
    /// Paid without a transaction and without a collection reference.
    MissingCollectionReference,
    /// Paid, but its transaction was already reversed.
    ReversedWhilePaid,
    /// A transaction whose invoice is neither live nor archived.
    OrphanedTransaction,
}

/// An inconsistency left for an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualRepair {
    /// Affected invoice.
    pub invoice_id: InvoiceId,
    /// Transaction involved, if any.
    pub transaction_id: Option<LedgerTransactionId>,
    /// What is wrong.
    pub reason: ManualReason,
}

/// A repair attempt that failed; the next sweep tries again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairFailure {
    /// Affected invoice.
    pub invoice_id: InvoiceId,
    /// Error code.
    pub code: &'static str,
    /// Error text.
    pub message: String,
    /// Whether the failure is transient.
    pub retryable: bool,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Invoices and orphaned transactions examined.
    pub scanned: usize,
    /// Repairs carried out.
    pub corrections: Vec<Correction>,
    /// Inconsistencies needing an operator.
    pub manual: Vec<ManualRepair>,
    /// Repairs that failed.
    pub failures: Vec<RepairFailure>,
}

impl RepairReport {
    /// True when nothing needed repair or attention.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty() && self.manual.is_empty() && self.failures.is_empty()
    }

    fn correct(&mut self, invoice_id: InvoiceId, action: RepairAction) {
        tracing::warn!(invoice_id = %invoice_id, action = ?action, "Reconciliation correction applied");
        self.corrections.push(Correction { invoice_id, action });
    }

    fn escalate(
        &mut self,
        invoice_id: InvoiceId,
        transaction_id: Option<LedgerTransactionId>,
        reason: ManualReason,
    ) {
        tracing::error!(
            invoice_id = %invoice_id,
            transaction_id = ?transaction_id,
            reason = ?reason,
            "Inconsistency requires manual repair"
        );
        self.manual.push(ManualRepair {
            invoice_id,
            transaction_id,
            reason,
        });
    }

    fn fail(&mut self, invoice_id: InvoiceId, err: &BillingError) {
        tracing::error!(invoice_id = %invoice_id, error = %err, "Reconciliation step failed");
        self.failures.push(RepairFailure {
            invoice_id,
            code: err.error_code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        });
    }
}

/// Sweeps every live invoice and ledger transaction.
pub struct DraftReconciler {
    invoices: Arc<dyn InvoiceStore>,
    ledger: Arc<dyn LedgerStore>,
    archive: Arc<dyn ArchiveStore>,
    executor: TransitionExecutor,
    locks: LockRegistry,
}

impl DraftReconciler {
    /// Creates a reconciler sharing the engine's invoice locks.
    #[must_use]
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        ledger: Arc<dyn LedgerStore>,
        archive: Arc<dyn ArchiveStore>,
        executor: TransitionExecutor,
        locks: LockRegistry,
    ) -> Self {
        Self {
            invoices,
            ledger,
            archive,
            executor,
            locks,
        }
    }

    /// Runs one sweep. Recreated transactions are booked on `today`.
    ///
    /// # Errors
    ///
    /// Only fails when the stores cannot be listed. Per-invoice errors are
    /// collected in the report.
    pub async fn run(&self, today: NaiveDate) -> Result<RepairReport, BillingError> {
        let mut report = RepairReport::default();

        for invoice_id in self.invoices.list_ids().await? {
            report.scanned += 1;
            if let Err(err) = self.reconcile_invoice(invoice_id, today, &mut report).await {
                report.fail(invoice_id, &err);
            }
        }

        for tx in self.ledger.list().await? {
            if let Err(err) = self.reconcile_orphan(&tx, &mut report).await {
                report.fail(tx.invoice_id, &err);
            }
        }

        tracing::info!(
            scanned = report.scanned,
            corrections = report.corrections.len(),
            manual = report.manual.len(),
            failures = report.failures.len(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn reconcile_invoice(
        &self,
        invoice_id: InvoiceId,
        today: NaiveDate,
        report: &mut RepairReport,
    ) -> Result<(), BillingError> {
        let _guard = self.locks.acquire(invoice_id.into_inner()).await?;

        // Archived since listing.
        let Some(invoice) = self.invoices.get(invoice_id).await? else {
            return Ok(());
        };

        if invoice.status == InvoiceStatus::Paid {
            self.reconcile_paid(invoice, today, report).await
        } else {
            self.reconcile_unpaid(invoice, report).await
        }
    }

    async fn reconcile_paid(
        &self,
        invoice: Invoice,
        today: NaiveDate,
        report: &mut RepairReport,
    ) -> Result<(), BillingError> {
        if invoice.pending_status.is_some() {
            let id = invoice.id;
            self.executor.finish_undo(invoice).await?;
            report.correct(id, RepairAction::CompletedReversal);
            return Ok(());
        }

        let sync = self.executor.synchronizer();
        let Some(tx) = self.ledger.find_by_invoice(invoice.id).await? else {
            let Some(collection) = invoice.collection else {
                report.escalate(invoice.id, None, ManualReason::MissingCollectionReference);
                return Ok(());
            };
            let materialized = sync
                .materialize(&invoice, &collection, today)
                .await?;
            let mut repaired = invoice;
            repaired.ledger_transaction_id = Some(materialized.transaction().id);
            self.executor.write(&repaired).await?;
            report.correct(repaired.id, RepairAction::Rematerialized);
            return Ok(());
        };

        match sync.credit_state(&tx).await? {
            CreditState::Reversed => {
                report.escalate(invoice.id, Some(tx.id), ManualReason::ReversedWhilePaid);
                return Ok(());
            }
            CreditState::Missing => {
                sync.ensure_credited(&tx).await?;
                report.correct(invoice.id, RepairAction::CreditedBalance);
            }
            CreditState::Credited => {}
        }

        let collection = tx.collection();
        if invoice.collection != Some(collection) || invoice.ledger_transaction_id != Some(tx.id) {
            let action = if invoice.collection == Some(collection) {
                RepairAction::RelinkedTransaction
            } else {
                RepairAction::RestoredCollection
            };
            let mut repaired = invoice;
            repaired.collection = Some(collection);
            repaired.ledger_transaction_id = Some(tx.id);
            self.executor.write(&repaired).await?;
            report.correct(repaired.id, action);
        }

        Ok(())
    }

    async fn reconcile_unpaid(
        &self,
        invoice: Invoice,
        report: &mut RepairReport,
    ) -> Result<(), BillingError> {
        let has_tx = self.ledger.find_by_invoice(invoice.id).await?.is_some();
        let stale = has_tx
            || invoice.collection.is_some()
            || invoice.ledger_transaction_id.is_some()
            || invoice.pending_status.is_some();
        if !stale {
            return Ok(());
        }

        self.executor.synchronizer().dematerialize(invoice.id).await?;

        let mut repaired = invoice;
        repaired.collection = None;
        repaired.ledger_transaction_id = None;
        repaired.pending_status = None;
        self.executor.write(&repaired).await?;
        report.correct(repaired.id, RepairAction::ClearedStaleLedger);
        Ok(())
    }

    async fn reconcile_orphan(
        &self,
        tx: &LedgerTransaction,
        report: &mut RepairReport,
    ) -> Result<(), BillingError> {
        let _guard = self.locks.acquire(tx.invoice_id.into_inner()).await?;

        if self.invoices.get(tx.invoice_id).await?.is_some() {
            return Ok(());
        }
        // Removed by an earlier step of this sweep.
        if self.ledger.get(tx.id).await?.is_none() {
            return Ok(());
        }

        report.scanned += 1;
        if self.archive.contains(tx.invoice_id.into_inner()).await? {
            self.executor.synchronizer().remove_archived(tx).await?;
            report.correct(tx.invoice_id, RepairAction::FinishedArchival);
        } else {
            report.escalate(tx.invoice_id, Some(tx.id), ManualReason::OrphanedTransaction);
        }
        Ok(())
    }
}
