//! The billing engine facade.
//!
//! Serializes every invoice-level operation on a per-invoice lock and wires
//! the calculator, status machine, ledger synchronizer, reconciler and
//! archiver over one set of stores.

use chrono::{Datelike, NaiveDate, Utc};
use std::time::Duration;
use tokio::sync::Mutex;
use visadesk_shared::BillingConfig;
use visadesk_shared::types::{AccountId, InvoiceId};

use super::archive::{ArchiveSummary, Archiver, period_bounds};
use super::balance::BalanceAdjuster;
use super::error::{BillingError, StoreError};
use super::ledger::LedgerSynchronizer;
use super::locks::LockRegistry;
use super::numbering::{InvoiceNumberSequence, normalize_number};
use super::reconcile::{DraftReconciler, RepairReport};
use super::records::{Account, ArchiveRecord, NewAccount};
use super::status::InvoiceStatus;
use super::store::EngineStores;
use super::totals::{FeeSchedule, TotalsCalculator};
use super::transition::{TransitionExecutor, TransitionOutcome};
use super::types::{
    CollectionDraft, Invoice, InvoiceEdit, InvoiceTerms, LineBreakdown, LineItem, NewInvoice,
    Totals,
};

/// Attempts to find a free invoice number before giving up.
const NUMBER_ATTEMPTS: usize = 5;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Fees for the totals calculation.
    pub fees: FeeSchedule,
    /// How long to wait for an invoice or account lock.
    pub lock_timeout: Duration,
    /// Optimistic retries per balance update.
    pub balance_retry_limit: u32,
    /// Prefix for generated invoice numbers.
    pub invoice_number_prefix: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&BillingConfig::default())
    }
}

impl From<&BillingConfig> for EngineSettings {
    fn from(config: &BillingConfig) -> Self {
        Self {
            fees: FeeSchedule::from(config),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            balance_retry_limit: config.balance_retry_limit,
            invoice_number_prefix: config.invoice_number_prefix.clone(),
        }
    }
}

/// Invoice lifecycle and ledger reconciliation engine.
pub struct BillingEngine {
    stores: EngineStores,
    settings: EngineSettings,
    invoice_locks: LockRegistry,
    account_locks: LockRegistry,
    numbering: Mutex<()>,
    executor: TransitionExecutor,
}

impl BillingEngine {
    /// Builds an engine over `stores`.
    #[must_use]
    pub fn new(stores: EngineStores, settings: EngineSettings) -> Self {
        let account_locks = LockRegistry::new("account", settings.lock_timeout);
        let balances = BalanceAdjuster::new(
            stores.accounts.clone(),
            account_locks.clone(),
            settings.balance_retry_limit,
        );
        let synchronizer = LedgerSynchronizer::new(stores.ledger.clone(), balances);
        let executor =
            TransitionExecutor::new(stores.invoices.clone(), stores.accounts.clone(), synchronizer);

        Self {
            invoice_locks: LockRegistry::new("invoice", settings.lock_timeout),
            account_locks,
            numbering: Mutex::new(()),
            stores,
            settings,
            executor,
        }
    }

    /// Engine settings.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Invoice and account keys currently locked or waited for.
    #[must_use]
    pub fn locked_keys(&self) -> usize {
        self.invoice_locks.len() + self.account_locks.len()
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    // ========== Totals ==========

    /// Computes totals for line items and terms without storing anything.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed input.
    pub fn compute_totals(
        &self,
        items: &[LineItem],
        terms: &InvoiceTerms,
    ) -> Result<Totals, BillingError> {
        TotalsCalculator::compute(items, terms, &self.settings.fees)
    }

    /// Per-line pre-tax and tax split, for document rendering.
    #[must_use]
    pub fn line_breakdown(&self, invoice: &Invoice) -> Vec<LineBreakdown> {
        invoice
            .line_items
            .iter()
            .map(|item| TotalsCalculator::line_breakdown(item, &invoice.terms))
            .collect()
    }

    // ========== Invoices ==========

    /// Creates a draft invoice with a unique number.
    ///
    /// A requested number that is already taken is replaced by a generated
    /// one before the insert.
    ///
    /// # Errors
    ///
    /// Returns a validation error or a store error.
    pub async fn create_invoice(&self, new: NewInvoice) -> Result<Invoice, BillingError> {
        if new.due_date.is_some_and(|due| due < new.issue_date) {
            return Err(BillingError::DueBeforeIssue);
        }
        let totals = self.compute_totals(&new.line_items, &new.terms)?;
        let requested = new.number.as_deref().map(normalize_number).transpose()?;

        let mut invoice = Invoice {
            id: InvoiceId::new(),
            number: String::new(),
            client_id: new.client_id,
            line_items: new.line_items,
            terms: new.terms,
            totals,
            status: InvoiceStatus::Draft,
            pending_status: None,
            issue_date: new.issue_date,
            due_date: new.due_date,
            collection: None,
            ledger_transaction_id: None,
            notes: new.notes,
        };

        let _numbering = self.numbering.lock().await;
        let mut candidate = match requested {
            Some(number) => {
                if self.stores.invoices.number_exists(&number).await? {
                    let generated = self.generate_number(invoice.issue_date).await?;
                    tracing::info!(
                        requested = %number,
                        assigned = %generated,
                        "Invoice number taken, generated a new one"
                    );
                    generated
                } else {
                    number
                }
            }
            None => self.generate_number(invoice.issue_date).await?,
        };

        for attempt in 1..=NUMBER_ATTEMPTS {
            invoice.number = candidate;
            match self.stores.invoices.insert(&invoice).await {
                Ok(()) => {
                    tracing::info!(
                        invoice_id = %invoice.id,
                        number = %invoice.number,
                        grand_total = %invoice.totals.grand_total,
                        "Invoice created"
                    );
                    return Ok(invoice);
                }
                Err(StoreError::Conflict(reason)) if attempt < NUMBER_ATTEMPTS => {
                    tracing::debug!(
                        number = %invoice.number,
                        reason = %reason,
                        attempt,
                        "Invoice number collided, regenerating"
                    );
                    candidate = self.generate_number(invoice.issue_date).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(StoreError::Conflict(format!(
            "no free invoice number after {NUMBER_ATTEMPTS} attempts"
        ))
        .into())
    }

    async fn generate_number(&self, issue_date: NaiveDate) -> Result<String, BillingError> {
        let stem = InvoiceNumberSequence::new(
            self.settings.invoice_number_prefix.clone(),
            issue_date.year(),
        )
        .stem();
        let existing = self.stores.invoices.numbers_with_prefix(&stem).await?;
        let mut seq = InvoiceNumberSequence::resume(
            self.settings.invoice_number_prefix.clone(),
            issue_date.year(),
            existing.iter().map(String::as_str),
        );

        loop {
            let number = seq.next_number()?;
            if !self.stores.invoices.number_exists(&number).await? {
                return Ok(number);
            }
        }
    }

    /// Replaces the editable content of a draft or sent invoice and recomputes totals.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceLocked` for paid or cancelled invoices,
    /// `TransitionPending` while an undo is unfinished, or a validation error.
    pub async fn update_invoice(
        &self,
        id: InvoiceId,
        edit: InvoiceEdit,
    ) -> Result<Invoice, BillingError> {
        let _guard = self.invoice_locks.acquire(id.into_inner()).await?;
        let mut invoice = self.load(id).await?;

        if let Some(pending) = invoice.pending_status {
            return Err(BillingError::TransitionPending { pending });
        }
        if !invoice.is_editable() {
            return Err(BillingError::InvoiceLocked(invoice.status));
        }
        if edit.due_date.is_some_and(|due| due < invoice.issue_date) {
            return Err(BillingError::DueBeforeIssue);
        }

        invoice.totals = self.compute_totals(&edit.line_items, &edit.terms)?;
        invoice.line_items = edit.line_items;
        invoice.terms = edit.terms;
        invoice.due_date = edit.due_date;
        invoice.notes = edit.notes;
        self.executor.write(&invoice).await?;

        tracing::info!(
            invoice_id = %invoice.id,
            grand_total = %invoice.totals.grand_total,
            "Invoice updated"
        );
        Ok(invoice)
    }

    /// Administrative delete. A paid invoice is cancelled through the ledger first.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound` or the error of the cancelling transition.
    pub async fn delete_invoice(&self, id: InvoiceId) -> Result<(), BillingError> {
        let _guard = self.invoice_locks.acquire(id.into_inner()).await?;
        let mut invoice = self.load(id).await?;

        let has_ledger = invoice.status == InvoiceStatus::Paid
            || invoice.pending_status.is_some()
            || invoice.collection.is_some()
            || invoice.ledger_transaction_id.is_some();
        if has_ledger {
            let target = invoice.pending_status.unwrap_or(InvoiceStatus::Cancelled);
            invoice = self
                .executor
                .execute(invoice, target, CollectionDraft::default(), Self::today())
                .await?
                .invoice;
        }

        self.stores.invoices.delete(invoice.id).await?;
        tracing::info!(invoice_id = %invoice.id, number = %invoice.number, "Invoice deleted");
        Ok(())
    }

    /// Fetches an invoice.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound`.
    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        self.load(id).await
    }

    async fn load(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        self.stores
            .invoices
            .get(id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    // ========== Lifecycle ==========

    /// Moves an invoice to `target`.
    ///
    /// Moving into `paid` needs a complete `collection`; concurrent requests
    /// for the same invoice run one after another.
    ///
    /// # Errors
    ///
    /// See [`TransitionExecutor::execute`].
    pub async fn transition(
        &self,
        id: InvoiceId,
        target: InvoiceStatus,
        collection: CollectionDraft,
    ) -> Result<TransitionOutcome, BillingError> {
        let _guard = self.invoice_locks.acquire(id.into_inner()).await?;
        let invoice = self.load(id).await?;
        self.executor
            .execute(invoice, target, collection, Self::today())
            .await
    }

    /// Runs the reconciliation sweep.
    ///
    /// # Errors
    ///
    /// Returns a store error when the stores cannot be listed.
    pub async fn reconcile(&self) -> Result<RepairReport, BillingError> {
        DraftReconciler::new(
            self.stores.invoices.clone(),
            self.stores.ledger.clone(),
            self.stores.archive.clone(),
            self.executor.clone(),
            self.invoice_locks.clone(),
        )
        .run(Self::today())
        .await
    }

    /// Archives the finalized invoices of a month.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPeriod` or a store error.
    pub async fn close_period(&self, year: i32, month: u32) -> Result<ArchiveSummary, BillingError> {
        Archiver::new(
            self.stores.invoices.clone(),
            self.stores.ledger.clone(),
            self.stores.archive.clone(),
            self.executor.synchronizer().clone(),
            self.invoice_locks.clone(),
        )
        .close_period(year, month)
        .await
    }

    /// Frozen copies taken when a month was closed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPeriod` or a store error.
    pub async fn archived(&self, year: i32, month: u32) -> Result<Vec<ArchiveRecord>, BillingError> {
        period_bounds(year, month)?;
        Ok(self.stores.archive.list(year, month).await?)
    }

    // ========== Accounts ==========

    /// Registers a cash register or bank account.
    ///
    /// # Errors
    ///
    /// Returns `BlankAccountName` or a store error.
    pub async fn register_account(&self, new: NewAccount) -> Result<Account, BillingError> {
        if new.name.trim().is_empty() {
            return Err(BillingError::BlankAccountName);
        }
        let account = Account::open(NewAccount {
            name: new.name.trim().to_string(),
            ..new
        });
        self.stores.accounts.insert(&account).await?;
        tracing::info!(account_id = %account.id, kind = %account.kind, "Account registered");
        Ok(account)
    }

    /// Fetches an account with its balances.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound`.
    pub async fn account(&self, id: AccountId) -> Result<Account, BillingError> {
        self.stores
            .accounts
            .get(id)
            .await?
            .ok_or(BillingError::AccountNotFound(id))
    }
}
