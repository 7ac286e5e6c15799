//! Persistence seams of the billing engine.
//!
//! The invoice, ledger, account and archive stores are written
//! independently. No method here spans two stores, and the engine never
//! assumes a write in one store is atomic with a write in another.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;
use visadesk_shared::types::{AccountId, Currency, InvoiceId, LedgerTransactionId};

use super::error::StoreError;
use super::records::{Account, AdjustmentKey, ArchiveRecord, BalanceApplication, LedgerTransaction};
use super::types::Invoice;

/// Live invoice storage.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Fetch an invoice by id.
    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;

    /// Insert a new invoice. `Conflict` when the id or number is taken.
    async fn insert(&self, invoice: &Invoice) -> Result<(), StoreError>;

    /// Replace an existing invoice. `NotFound` when it is gone.
    async fn update(&self, invoice: &Invoice) -> Result<(), StoreError>;

    /// Remove an invoice. Returns false when it did not exist.
    async fn delete(&self, id: InvoiceId) -> Result<bool, StoreError>;

    /// Whether any invoice carries `number`.
    async fn number_exists(&self, number: &str) -> Result<bool, StoreError>;

    /// Every invoice number starting with `stem`.
    async fn numbers_with_prefix(&self, stem: &str) -> Result<Vec<String>, StoreError>;

    /// Ids of all live invoices.
    async fn list_ids(&self) -> Result<Vec<InvoiceId>, StoreError>;

    /// Invoices with `from <= issue_date < until`.
    async fn list_issued_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<Invoice>, StoreError>;
}

/// Ledger transaction storage. Holds at most one transaction per invoice.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch a transaction by id.
    async fn get(&self, id: LedgerTransactionId) -> Result<Option<LedgerTransaction>, StoreError>;

    /// The transaction sourced from `invoice_id`, if any.
    async fn find_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<LedgerTransaction>, StoreError>;

    /// Insert a transaction. `Conflict` when the invoice already has one.
    async fn insert(&self, transaction: &LedgerTransaction) -> Result<(), StoreError>;

    /// Remove a transaction. Returns false when it did not exist.
    async fn delete(&self, id: LedgerTransactionId) -> Result<bool, StoreError>;

    /// All live transactions.
    async fn list(&self) -> Result<Vec<LedgerTransaction>, StoreError>;
}

/// Account directory and per-currency balances.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch an account by id.
    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Register a new account.
    async fn insert(&self, account: &Account) -> Result<(), StoreError>;

    /// Adds `delta` to the `currency` bucket and records `key` in one write.
    ///
    /// Returns `AlreadyApplied` without touching the balance when `key` was
    /// recorded before. `NotFound` when the account is gone;
    /// `ConcurrentModification` when an optimistic version check lost.
    async fn apply_delta(
        &self,
        account_id: AccountId,
        currency: Currency,
        delta: Decimal,
        key: AdjustmentKey,
    ) -> Result<BalanceApplication, StoreError>;

    /// Whether `key` has been applied.
    async fn has_adjustment(&self, key: AdjustmentKey) -> Result<bool, StoreError>;
}

/// Write-once archive of closed periods.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Store a record. `Conflict` when `(year, month, original_id)` exists.
    async fn insert(&self, record: &ArchiveRecord) -> Result<(), StoreError>;

    /// Whether any archive record holds `original_id`.
    async fn contains(&self, original_id: Uuid) -> Result<bool, StoreError>;

    /// Records of one closed period.
    async fn list(&self, year: i32, month: u32) -> Result<Vec<ArchiveRecord>, StoreError>;
}

/// The four stores the engine writes to.
#[derive(Clone)]
pub struct EngineStores {
    /// Invoices.
    pub invoices: Arc<dyn InvoiceStore>,
    /// Ledger transactions.
    pub ledger: Arc<dyn LedgerStore>,
    /// Accounts and balances.
    pub accounts: Arc<dyn AccountStore>,
    /// Archive records.
    pub archive: Arc<dyn ArchiveStore>,
}
