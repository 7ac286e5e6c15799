//! Period close.
//!
//! Copies finalized invoices of a month and their ledger transactions into
//! write-once archive records, then removes them from the live stores.
//! Balances are not touched: the archived transaction stays counted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::error::{BillingError, StoreError};
use super::ledger::LedgerSynchronizer;
use super::locks::LockRegistry;
use super::records::{ArchiveKind, ArchiveRecord};
use super::status::InvoiceStatus;
use super::store::{ArchiveStore, InvoiceStore, LedgerStore};
use super::types::Invoice;

/// Counts from one period close.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    /// Closed year.
    pub year: i32,
    /// Closed month.
    pub month: u32,
    /// Invoices moved to the archive.
    pub archived_invoices: usize,
    /// Ledger transactions moved to the archive.
    pub archived_transactions: usize,
    /// Invoices left live: not finalized, or awaiting reconciliation.
    pub skipped: usize,
}

/// First day of the month and first day of the next month.
///
/// # Errors
///
/// Returns `InvalidPeriod` for a month outside 1-12 or an unrepresentable year.
pub fn period_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), BillingError> {
    let invalid = || BillingError::InvalidPeriod { year, month };
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    let from = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let until = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(invalid)?;
    Ok((from, until))
}

/// Moves a closed period into the archive.
pub struct Archiver {
    invoices: Arc<dyn InvoiceStore>,
    ledger: Arc<dyn LedgerStore>,
    archive: Arc<dyn ArchiveStore>,
    synchronizer: LedgerSynchronizer,
    locks: LockRegistry,
}

impl Archiver {
    /// Creates an archiver sharing the engine's invoice locks.
    #[must_use]
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        ledger: Arc<dyn LedgerStore>,
        archive: Arc<dyn ArchiveStore>,
        synchronizer: LedgerSynchronizer,
        locks: LockRegistry,
    ) -> Self {
        Self {
            invoices,
            ledger,
            archive,
            synchronizer,
            locks,
        }
    }

    /// Archives every paid or cancelled invoice issued in `year`-`month`.
    ///
    /// Re-running a close is safe: records already archived are kept as they
    /// are and the live copies are removed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPeriod`, a lock timeout or a store error. Invoices
    /// archived before the error stay archived.
    pub async fn close_period(&self, year: i32, month: u32) -> Result<ArchiveSummary, BillingError> {
        let (from, until) = period_bounds(year, month)?;
        let mut summary = ArchiveSummary {
            year,
            month,
            ..ArchiveSummary::default()
        };
        let archived_at = Utc::now();

        for listed in self.invoices.list_issued_between(from, until).await? {
            let _guard = self.locks.acquire(listed.id.into_inner()).await?;
            let Some(invoice) = self.invoices.get(listed.id).await? else {
                continue;
            };
            let tx = self.ledger.find_by_invoice(invoice.id).await?;

            if !Self::is_final(&invoice, tx.is_some()) {
                tracing::debug!(
                    invoice_id = %invoice.id,
                    status = %invoice.status,
                    "Invoice not archivable, left live"
                );
                summary.skipped += 1;
                continue;
            }

            self.freeze(
                year,
                month,
                invoice.id.into_inner(),
                ArchiveKind::Invoice,
                &invoice,
                archived_at,
            )
            .await?;
            if let Some(tx) = &tx {
                self.freeze(
                    year,
                    month,
                    tx.id.into_inner(),
                    ArchiveKind::LedgerTransaction,
                    tx,
                    archived_at,
                )
                .await?;
            }

            // Invoice first: a leftover transaction of an archived invoice is
            // recognised and removed by reconciliation.
            self.invoices.delete(invoice.id).await?;
            if let Some(tx) = &tx {
                self.synchronizer.remove_archived(tx).await?;
                summary.archived_transactions += 1;
            }
            summary.archived_invoices += 1;
        }

        tracing::info!(
            year,
            month,
            archived_invoices = summary.archived_invoices,
            archived_transactions = summary.archived_transactions,
            skipped = summary.skipped,
            "Period closed"
        );
        Ok(summary)
    }

    /// Paid with its transaction, or cancelled with no ledger state at all.
    fn is_final(invoice: &Invoice, has_tx: bool) -> bool {
        if invoice.pending_status.is_some() {
            return false;
        }
        match invoice.status {
            InvoiceStatus::Paid => has_tx && invoice.collection.is_some(),
            InvoiceStatus::Cancelled => {
                !has_tx && invoice.collection.is_none() && invoice.ledger_transaction_id.is_none()
            }
            InvoiceStatus::Draft | InvoiceStatus::Sent => false,
        }
    }

    async fn freeze<T: Serialize + Sync>(
        &self,
        year: i32,
        month: u32,
        original_id: Uuid,
        kind: ArchiveKind,
        value: &T,
        archived_at: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        let payload = serde_json::to_value(value)
            .map_err(|err| StoreError::Backend(format!("archive serialization failed: {err}")))?;
        let record = ArchiveRecord {
            year,
            month,
            original_id,
            kind,
            payload,
            archived_at,
        };
        match self.archive.insert(&record).await {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict(_)) => {
                tracing::debug!(original_id = %original_id, "Already archived, keeping first copy");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
