//! In-memory store implementations.
//!
//! Used by tests and by the API when no database is configured. Each map
//! is a `DashMap`, so a single call is atomic per key but nothing spans two
//! stores, the same as the PostgreSQL adapters.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;
use visadesk_shared::types::{AccountId, Currency, InvoiceId, LedgerTransactionId};

use super::error::StoreError;
use super::records::{Account, AdjustmentKey, ArchiveRecord, BalanceApplication, LedgerTransaction};
use super::store::{AccountStore, ArchiveStore, EngineStores, InvoiceStore, LedgerStore};
use super::types::Invoice;

/// Consumes one unit of an injected-failure budget.
fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Invoices keyed by id, with a number index.
#[derive(Debug, Default)]
pub struct MemoryInvoiceStore {
    invoices: DashMap<InvoiceId, Invoice>,
    numbers: DashMap<String, InvoiceId>,
}

impl MemoryInvoiceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored invoices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invoices.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invoices.is_empty()
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        Ok(self.invoices.get(&id).map(|r| r.value().clone()))
    }

    async fn insert(&self, invoice: &Invoice) -> Result<(), StoreError> {
        if self.invoices.contains_key(&invoice.id) {
            return Err(StoreError::Conflict(format!(
                "invoice {} already exists",
                invoice.id
            )));
        }
        match self.numbers.entry(invoice.number.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "invoice number {} already exists",
                invoice.number
            ))),
            Entry::Vacant(slot) => {
                self.invoices.insert(invoice.id, invoice.clone());
                slot.insert(invoice.id);
                Ok(())
            }
        }
    }

    async fn update(&self, invoice: &Invoice) -> Result<(), StoreError> {
        let mut stored = self
            .invoices
            .get_mut(&invoice.id)
            .ok_or(StoreError::NotFound {
                entity: "invoice",
                id: invoice.id.into_inner(),
            })?;

        if stored.number != invoice.number {
            match self.numbers.entry(invoice.number.clone()) {
                Entry::Occupied(_) => {
                    return Err(StoreError::Conflict(format!(
                        "invoice number {} already exists",
                        invoice.number
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(invoice.id);
                }
            }
            self.numbers.remove(&stored.number);
        }

        *stored = invoice.clone();
        Ok(())
    }

    async fn delete(&self, id: InvoiceId) -> Result<bool, StoreError> {
        match self.invoices.remove(&id) {
            Some((_, invoice)) => {
                self.numbers.remove(&invoice.number);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn number_exists(&self, number: &str) -> Result<bool, StoreError> {
        Ok(self.numbers.contains_key(number))
    }

    async fn numbers_with_prefix(&self, stem: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .numbers
            .iter()
            .filter(|r| r.key().starts_with(stem))
            .map(|r| r.key().clone())
            .collect())
    }

    async fn list_ids(&self) -> Result<Vec<InvoiceId>, StoreError> {
        let mut ids: Vec<InvoiceId> = self.invoices.iter().map(|r| *r.key()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_issued_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<Invoice>, StoreError> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|r| r.issue_date >= from && r.issue_date < until)
            .map(|r| r.value().clone())
            .collect();
        invoices.sort_by_key(|i| (i.issue_date, i.id));
        Ok(invoices)
    }
}

/// Ledger transactions with a unique invoice index.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    transactions: DashMap<LedgerTransactionId, LedgerTransaction>,
    by_invoice: DashMap<InvoiceId, LedgerTransactionId>,
    fail_deletes: AtomicUsize,
}

impl MemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Makes the next `n` deletes fail with a backend error.
    pub fn fail_next_deletes(&self, n: usize) {
        self.fail_deletes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get(&self, id: LedgerTransactionId) -> Result<Option<LedgerTransaction>, StoreError> {
        Ok(self.transactions.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<LedgerTransaction>, StoreError> {
        let Some(id) = self.by_invoice.get(&invoice_id).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self.transactions.get(&id).map(|r| r.value().clone()))
    }

    async fn insert(&self, transaction: &LedgerTransaction) -> Result<(), StoreError> {
        match self.by_invoice.entry(transaction.invoice_id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "invoice {} already has a ledger transaction",
                transaction.invoice_id
            ))),
            Entry::Vacant(slot) => {
                self.transactions.insert(transaction.id, transaction.clone());
                slot.insert(transaction.id);
                Ok(())
            }
        }
    }

    async fn delete(&self, id: LedgerTransactionId) -> Result<bool, StoreError> {
        if take(&self.fail_deletes) {
            return Err(StoreError::Backend("injected delete failure".to_string()));
        }
        match self.transactions.remove(&id) {
            Some((_, transaction)) => {
                self.by_invoice
                    .remove_if(&transaction.invoice_id, |_, owner| *owner == id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<LedgerTransaction>, StoreError> {
        let mut transactions: Vec<LedgerTransaction> =
            self.transactions.iter().map(|r| r.value().clone()).collect();
        transactions.sort_by_key(|t| t.id);
        Ok(transactions)
    }
}

/// Accounts plus the journal of applied adjustment keys.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<AccountId, Account>,
    journal: DashMap<AdjustmentKey, Decimal>,
    fail_applies: AtomicUsize,
    conflict_applies: AtomicUsize,
}

impl MemoryAccountStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` balance applications fail with a backend error.
    pub fn fail_next_applies(&self, n: usize) {
        self.fail_applies.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` balance applications lose their version check.
    pub fn conflict_next_applies(&self, n: usize) {
        self.conflict_applies.store(n, Ordering::SeqCst);
    }

    /// Removes an account, as an external directory might.
    pub fn remove(&self, id: AccountId) -> Option<Account> {
        self.accounts.remove(&id).map(|(_, account)| account)
    }

    /// Number of recorded adjustments.
    #[must_use]
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&id).map(|r| r.value().clone()))
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        match self.accounts.entry(account.id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(account.clone());
                Ok(())
            }
        }
    }

    async fn apply_delta(
        &self,
        account_id: AccountId,
        currency: Currency,
        delta: Decimal,
        key: AdjustmentKey,
    ) -> Result<BalanceApplication, StoreError> {
        if take(&self.fail_applies) {
            return Err(StoreError::Backend("injected balance failure".to_string()));
        }
        if take(&self.conflict_applies) {
            return Err(StoreError::ConcurrentModification(account_id.into_inner()));
        }

        // The account guard serializes every application on this account.
        let mut account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::NotFound {
                entity: "account",
                id: account_id.into_inner(),
            })?;

        if self.journal.contains_key(&key) {
            return Ok(BalanceApplication::AlreadyApplied);
        }

        let bucket = account.balances.entry(currency).or_insert(Decimal::ZERO);
        *bucket += delta;
        let new_balance = *bucket;
        self.journal.insert(key, delta);

        Ok(BalanceApplication::Applied { new_balance })
    }

    async fn has_adjustment(&self, key: AdjustmentKey) -> Result<bool, StoreError> {
        Ok(self.journal.contains_key(&key))
    }
}

/// Archive records keyed by `(year, month, original_id)`.
#[derive(Debug, Default)]
pub struct MemoryArchiveStore {
    records: DashMap<(i32, u32, Uuid), ArchiveRecord>,
}

impl MemoryArchiveStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn insert(&self, record: &ArchiveRecord) -> Result<(), StoreError> {
        match self
            .records
            .entry((record.year, record.month, record.original_id))
        {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "{} {} already archived for {}-{:02}",
                record.kind.as_str(),
                record.original_id,
                record.year,
                record.month
            ))),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn contains(&self, original_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.records.iter().any(|r| r.key().2 == original_id))
    }

    async fn list(&self, year: i32, month: u32) -> Result<Vec<ArchiveRecord>, StoreError> {
        let mut records: Vec<ArchiveRecord> = self
            .records
            .iter()
            .filter(|r| r.key().0 == year && r.key().1 == month)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.original_id);
        Ok(records)
    }
}

/// A full set of in-memory stores with typed handles kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryStores {
    /// Invoices.
    pub invoices: Arc<MemoryInvoiceStore>,
    /// Ledger transactions.
    pub ledger: Arc<MemoryLedgerStore>,
    /// Accounts and balances.
    pub accounts: Arc<MemoryAccountStore>,
    /// Archive records.
    pub archive: Arc<MemoryArchiveStore>,
}

impl MemoryStores {
    /// Creates empty stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Type-erased handles for the engine.
    #[must_use]
    pub fn engine_stores(&self) -> EngineStores {
        EngineStores {
            invoices: self.invoices.clone(),
            ledger: self.ledger.clone(),
            accounts: self.accounts.clone(),
            archive: self.archive.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::records::NewAccount;
    use crate::billing::types::AccountKind;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn account() -> Account {
        Account::open(NewAccount {
            name: "Main bank".to_string(),
            kind: AccountKind::BankAccount,
            initial_amounts: BTreeMap::new(),
        })
    }

    #[tokio::test]
    async fn test_apply_delta_records_key_once() {
        let store = MemoryAccountStore::new();
        let account = account();
        store.insert(&account).await.unwrap();
        let key = AdjustmentKey::credit(LedgerTransactionId::new());

        let first = store
            .apply_delta(account.id, Currency::Try, dec!(100), key)
            .await
            .unwrap();
        let second = store
            .apply_delta(account.id, Currency::Try, dec!(100), key)
            .await
            .unwrap();

        assert_eq!(
            first,
            BalanceApplication::Applied {
                new_balance: dec!(100)
            }
        );
        assert_eq!(second, BalanceApplication::AlreadyApplied);
        assert!(store.has_adjustment(key).await.unwrap());
        let stored = store.get(account.id).await.unwrap().unwrap();
        assert_eq!(stored.movement(Currency::Try), dec!(100));
    }

    #[tokio::test]
    async fn test_apply_delta_missing_account() {
        let store = MemoryAccountStore::new();
        let result = store
            .apply_delta(
                AccountId::new(),
                Currency::Eur,
                dec!(1),
                AdjustmentKey::credit(LedgerTransactionId::new()),
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryAccountStore::new();
        let account = account();
        store.insert(&account).await.unwrap();
        store.fail_next_applies(1);

        let key = AdjustmentKey::credit(LedgerTransactionId::new());
        assert!(matches!(
            store.apply_delta(account.id, Currency::Try, dec!(5), key).await,
            Err(StoreError::Backend(_))
        ));
        assert!(store
            .apply_delta(account.id, Currency::Try, dec!(5), key)
            .await
            .is_ok());
        assert_eq!(store.journal_len(), 1);
    }

    #[tokio::test]
    async fn test_archive_is_write_once() {
        let store = MemoryArchiveStore::new();
        let record = ArchiveRecord {
            year: 2026,
            month: 3,
            original_id: Uuid::now_v7(),
            kind: crate::billing::records::ArchiveKind::Invoice,
            payload: serde_json::json!({}),
            archived_at: chrono::Utc::now(),
        };

        store.insert(&record).await.unwrap();
        assert!(matches!(
            store.insert(&record).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(store.contains(record.original_id).await.unwrap());
        assert_eq!(store.list(2026, 3).await.unwrap().len(), 1);
        assert!(store.list(2026, 4).await.unwrap().is_empty());
    }
}
