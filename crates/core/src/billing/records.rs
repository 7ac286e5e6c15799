//! Ledger, account and archive records owned by the engine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;
use visadesk_shared::types::{AccountId, Currency, InvoiceId, LedgerTransactionId, Money};

use super::types::{AccountKind, CollectionRef, Invoice, PaymentMethod};

/// Category recorded on every transaction created from an invoice.
pub const INVOICE_COLLECTION_CATEGORY: &str = "invoice_collection";

/// Direction of money relative to the agency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Money received.
    Inflow,
    /// Money paid out.
    Outflow,
}

impl Direction {
    /// Returns the string representation of the direction.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inflow => "inflow",
            Self::Outflow => "outflow",
        }
    }

    /// Parses a direction from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inflow" => Some(Self::Inflow),
            "outflow" => Some(Self::Outflow),
            _ => None,
        }
    }

    /// Sign applied to the account balance.
    #[must_use]
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            Self::Inflow => amount,
            Self::Outflow => -amount,
        }
    }
}

/// A cash movement tied to exactly one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique identifier.
    pub id: LedgerTransactionId,
    /// The invoice this transaction was materialized from.
    pub invoice_id: InvoiceId,
    /// Direction of the movement.
    pub direction: Direction,
    /// Reporting category.
    pub category: String,
    /// Amount and currency.
    pub amount: Money,
    /// How the money moved.
    pub payment_method: PaymentMethod,
    /// Kind of the target account.
    pub account_kind: AccountKind,
    /// Target account.
    pub account_id: AccountId,
    /// Booking date.
    pub transaction_date: NaiveDate,
}

impl LedgerTransaction {
    /// Builds the inflow that collects `invoice` into `collection`.
    #[must_use]
    pub fn for_invoice(invoice: &Invoice, collection: &CollectionRef, on: NaiveDate) -> Self {
        Self {
            id: LedgerTransactionId::new(),
            invoice_id: invoice.id,
            direction: Direction::Inflow,
            category: INVOICE_COLLECTION_CATEGORY.to_string(),
            amount: Money::new(invoice.totals.grand_total, invoice.currency()),
            payment_method: collection.payment_method,
            account_kind: collection.account_kind,
            account_id: collection.account_id,
            transaction_date: on,
        }
    }

    /// Delta this transaction applies to its account balance.
    #[must_use]
    pub fn balance_delta(&self) -> Decimal {
        self.direction.signed(self.amount.amount)
    }

    /// Whether this transaction books `invoice`'s current total into `collection`.
    #[must_use]
    pub fn books(&self, invoice: &Invoice, collection: &CollectionRef) -> bool {
        self.invoice_id == invoice.id
            && self.amount.amount == invoice.totals.grand_total
            && self.amount.currency == invoice.currency()
            && self.collection() == *collection
    }

    /// The collection reference this transaction was booked against.
    #[must_use]
    pub fn collection(&self) -> CollectionRef {
        CollectionRef {
            account_kind: self.account_kind,
            account_id: self.account_id,
            payment_method: self.payment_method,
        }
    }
}

/// A cash register or bank account with per-currency balances.
///
/// `initial_amounts` are fixed at creation. `balances` hold only the sum of
/// deltas applied by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Display name.
    pub name: String,
    /// Cash register or bank account.
    pub kind: AccountKind,
    /// Opening amounts per currency.
    pub initial_amounts: BTreeMap<Currency, Decimal>,
    /// Net engine-applied movement per currency.
    pub balances: BTreeMap<Currency, Decimal>,
}

impl Account {
    /// Creates an account with no movement yet.
    #[must_use]
    pub fn open(new: NewAccount) -> Self {
        Self {
            id: AccountId::new(),
            name: new.name,
            kind: new.kind,
            initial_amounts: new.initial_amounts,
            balances: BTreeMap::new(),
        }
    }

    /// Engine-applied movement in `currency`.
    #[must_use]
    pub fn movement(&self, currency: Currency) -> Decimal {
        self.balances.get(&currency).copied().unwrap_or_default()
    }

    /// Opening amount plus movement in `currency`.
    #[must_use]
    pub fn current_balance(&self, currency: Currency) -> Decimal {
        self.initial_amounts
            .get(&currency)
            .copied()
            .unwrap_or_default()
            + self.movement(currency)
    }
}

/// Input for registering an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    /// Display name.
    pub name: String,
    /// Cash register or bank account.
    pub kind: AccountKind,
    /// Opening amounts per currency.
    #[serde(default)]
    pub initial_amounts: BTreeMap<Currency, Decimal>,
}

/// What a balance adjustment does for its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentKind {
    /// Books the transaction onto the account.
    Credit,
    /// Takes a previously booked transaction back off.
    Reversal,
}

impl AdjustmentKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Reversal => "reversal",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(Self::Credit),
            "reversal" => Some(Self::Reversal),
            _ => None,
        }
    }
}

/// Identifies one balance application so it is applied at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdjustmentKey {
    /// Transaction the adjustment belongs to.
    pub transaction_id: LedgerTransactionId,
    /// Credit or reversal.
    pub kind: AdjustmentKind,
}

impl AdjustmentKey {
    /// The booking of `transaction_id`.
    #[must_use]
    pub const fn credit(transaction_id: LedgerTransactionId) -> Self {
        Self {
            transaction_id,
            kind: AdjustmentKind::Credit,
        }
    }

    /// The reversal of `transaction_id`.
    #[must_use]
    pub const fn reversal(transaction_id: LedgerTransactionId) -> Self {
        Self {
            transaction_id,
            kind: AdjustmentKind::Reversal,
        }
    }
}

impl fmt::Display for AdjustmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.kind.as_str())
    }
}

/// Result of asking an account store to apply a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceApplication {
    /// The delta was applied; carries the new movement for the currency.
    Applied {
        /// Movement after the delta.
        new_balance: Decimal,
    },
    /// This key was applied earlier; nothing changed.
    AlreadyApplied,
}

/// What an archive record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// A frozen invoice.
    Invoice,
    /// A frozen ledger transaction.
    LedgerTransaction,
}

impl ArchiveKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::LedgerTransaction => "ledger_transaction",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invoice" => Some(Self::Invoice),
            "ledger_transaction" => Some(Self::LedgerTransaction),
            _ => None,
        }
    }
}

/// Write-once frozen copy of a record at period close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// Closed year.
    pub year: i32,
    /// Closed month (1-12).
    pub month: u32,
    /// Id of the archived record.
    pub original_id: Uuid,
    /// Record type.
    pub kind: ArchiveKind,
    /// Serialized record.
    pub payload: serde_json::Value,
    /// When the copy was taken.
    pub archived_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_direction_sign() {
        assert_eq!(Direction::Inflow.signed(dec!(10)), dec!(10));
        assert_eq!(Direction::Outflow.signed(dec!(10)), dec!(-10));
        assert_eq!(Direction::parse("INFLOW"), Some(Direction::Inflow));
    }

    #[test]
    fn test_current_balance_adds_initial_amount() {
        let mut account = Account::open(NewAccount {
            name: "Istanbul office till".to_string(),
            kind: AccountKind::CashRegister,
            initial_amounts: BTreeMap::from([(Currency::Try, dec!(500))]),
        });
        account.balances.insert(Currency::Try, dec!(120.50));

        assert_eq!(account.current_balance(Currency::Try), dec!(620.50));
        assert_eq!(account.current_balance(Currency::Eur), Decimal::ZERO);
        assert_eq!(account.movement(Currency::Try), dec!(120.50));
    }

    #[test]
    fn test_adjustment_keys_differ_by_kind() {
        let id = LedgerTransactionId::new();
        assert_ne!(AdjustmentKey::credit(id), AdjustmentKey::reversal(id));
        assert_eq!(AdjustmentKey::credit(id).to_string(), format!("{id}:credit"));
        assert_eq!(AdjustmentKind::parse("reversal"), Some(AdjustmentKind::Reversal));
    }

    #[test]
    fn test_archive_kind_roundtrip() {
        for kind in [ArchiveKind::Invoice, ArchiveKind::LedgerTransaction] {
            assert_eq!(ArchiveKind::parse(kind.as_str()), Some(kind));
        }
    }
}
