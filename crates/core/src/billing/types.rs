//! Invoice domain types.
//!
//! An invoice owns its line items and its tax/discount terms. Totals are
//! always derived from those two through the
//! [`TotalsCalculator`](super::totals::TotalsCalculator) and stored alongside
//! them so read paths never recompute.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use visadesk_shared::types::{AccountId, ClientId, Currency, InvoiceId, LedgerTransactionId, round_money};

use super::error::BillingError;
use super::status::{DisplayStatus, InvoiceStatus};

/// A single billable line on an invoice.
///
/// `tax_exempt` takes precedence over `is_pre_tax`: an exempt line never
/// carries tax regardless of the other flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Free-text description shown on the rendered invoice.
    pub description: String,
    /// Quantity (non-negative).
    pub quantity: Decimal,
    /// Unit price in the invoice currency (non-negative).
    pub unit_price: Decimal,
    /// No tax ever applies to this line.
    #[serde(default)]
    pub tax_exempt: bool,
    /// The entered price already excludes tax.
    #[serde(default)]
    pub is_pre_tax: bool,
}

impl LineItem {
    /// Creates a tax-inclusive line.
    #[must_use]
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            tax_exempt: false,
            is_pre_tax: false,
        }
    }

    /// Marks the line as tax exempt.
    #[must_use]
    pub fn exempt(mut self) -> Self {
        self.tax_exempt = true;
        self
    }

    /// Marks the entered price as tax-exclusive.
    #[must_use]
    pub fn pre_tax(mut self) -> Self {
        self.is_pre_tax = true;
        self
    }

    /// Quantity × unit price, rounded to cents. Saturates instead of
    /// overflowing; validated lines never get near the limit.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        round_money(self.quantity.saturating_mul(self.unit_price))
    }
}

/// Tax configuration of an invoice. `rate` is a fraction (`0.19` = 19 %).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxConfig {
    /// Whether tax applies at all.
    pub enabled: bool,
    /// Tax rate as a fraction.
    pub rate: Decimal,
}

impl TaxConfig {
    /// Tax enabled at the given fractional rate.
    #[must_use]
    pub const fn at(rate: Decimal) -> Self {
        Self {
            enabled: true,
            rate,
        }
    }

    /// The rate that actually applies, zero when tax is disabled.
    #[must_use]
    pub fn effective_rate(&self) -> Decimal {
        if self.enabled { self.rate } else { Decimal::ZERO }
    }
}

/// Withholding configuration. `rate` is a fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WithholdingConfig {
    /// Whether withholding is requested for this invoice.
    pub enabled: bool,
    /// Withholding rate as a fraction.
    pub rate: Decimal,
}

impl WithholdingConfig {
    /// Withholding enabled at the given fractional rate.
    #[must_use]
    pub const fn at(rate: Decimal) -> Self {
        Self {
            enabled: true,
            rate,
        }
    }
}

/// Everything besides the line items that feeds the totals calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTerms {
    /// Invoice currency.
    pub currency: Currency,
    /// Tax configuration.
    #[serde(default)]
    pub tax: TaxConfig,
    /// Flat discount subtracted after tax.
    #[serde(default)]
    pub discount: Decimal,
    /// Whether the fixed stamp-duty fee applies.
    #[serde(default)]
    pub stamp_duty: bool,
    /// Withholding configuration.
    #[serde(default)]
    pub withholding: WithholdingConfig,
}

impl InvoiceTerms {
    /// Terms with no tax, discount, stamp duty or withholding.
    #[must_use]
    pub fn plain(currency: Currency) -> Self {
        Self {
            currency,
            tax: TaxConfig::default(),
            discount: Decimal::ZERO,
            stamp_duty: false,
            withholding: WithholdingConfig::default(),
        }
    }
}

/// Computed monetary totals of an invoice.
///
/// `grand_total = subtotal + tax_amount - discount + stamp_duty - withholding_amount`,
/// floored at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    /// Sum of pre-tax contributions.
    pub subtotal: Decimal,
    /// Sum of tax contributions.
    pub tax_amount: Decimal,
    /// Discount applied.
    pub discount: Decimal,
    /// Stamp duty applied.
    pub stamp_duty: Decimal,
    /// Withholding deducted.
    pub withholding_amount: Decimal,
    /// Amount due.
    pub grand_total: Decimal,
}

/// Per-line split used by document rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineBreakdown {
    /// Quantity × unit price.
    pub line_total: Decimal,
    /// Tax-exclusive part of the line.
    pub pre_tax: Decimal,
    /// Tax part of the line.
    pub tax: Decimal,
}

/// Kind of account money is collected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Physical cash register at an office.
    CashRegister,
    /// Bank account.
    BankAccount,
}

impl AccountKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CashRegister => "cash_register",
            Self::BankAccount => "bank_account",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cash_register" | "cash" => Some(Self::CashRegister),
            "bank_account" | "bank" => Some(Self::BankAccount),
            _ => None,
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the client paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash over the counter.
    Cash,
    /// Wire or EFT transfer.
    BankTransfer,
    /// Card payment.
    CreditCard,
    /// Cheque.
    Cheque,
}

impl PaymentMethod {
    /// Returns the string representation of the method.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::BankTransfer => "bank_transfer",
            Self::CreditCard => "credit_card",
            Self::Cheque => "cheque",
        }
    }

    /// Parses a method from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cash" => Some(Self::Cash),
            "bank_transfer" | "transfer" => Some(Self::BankTransfer),
            "credit_card" | "card" => Some(Self::CreditCard),
            "cheque" | "check" => Some(Self::Cheque),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how a paid invoice was collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRef {
    /// Kind of the receiving account.
    pub account_kind: AccountKind,
    /// Receiving account.
    pub account_id: AccountId,
    /// Payment method used.
    pub payment_method: PaymentMethod,
}

/// A possibly incomplete collection reference as supplied by an operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDraft {
    /// Kind of the receiving account.
    pub account_kind: Option<AccountKind>,
    /// Receiving account.
    pub account_id: Option<AccountId>,
    /// Payment method used.
    pub payment_method: Option<PaymentMethod>,
}

impl CollectionDraft {
    /// True when the operator supplied none of the fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.account_kind.is_none() && self.account_id.is_none() && self.payment_method.is_none()
    }

    /// Turns the draft into a full reference or names the missing fields.
    pub fn complete(self) -> Result<CollectionRef, BillingError> {
        match (self.account_kind, self.account_id, self.payment_method) {
            (Some(account_kind), Some(account_id), Some(payment_method)) => Ok(CollectionRef {
                account_kind,
                account_id,
                payment_method,
            }),
            _ => {
                let mut missing = Vec::new();
                if self.account_kind.is_none() {
                    missing.push("account_kind");
                }
                if self.account_id.is_none() {
                    missing.push("account_id");
                }
                if self.payment_method.is_none() {
                    missing.push("payment_method");
                }
                Err(BillingError::CollectionReferenceRequired { missing })
            }
        }
    }
}

impl From<CollectionRef> for CollectionDraft {
    fn from(value: CollectionRef) -> Self {
        Self {
            account_kind: Some(value.account_kind),
            account_id: Some(value.account_id),
            payment_method: Some(value.payment_method),
        }
    }
}

/// An invoice as stored in the live store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier.
    pub id: InvoiceId,
    /// Unique human-readable number.
    pub number: String,
    /// Owning client; `None` for manual entries.
    pub client_id: Option<ClientId>,
    /// Ordered line items.
    pub line_items: Vec<LineItem>,
    /// Currency, tax and adjustment terms.
    pub terms: InvoiceTerms,
    /// Totals computed from `line_items` and `terms`.
    pub totals: Totals,
    /// Stored lifecycle status.
    pub status: InvoiceStatus,
    /// Target of an undo-of-paid that has started but not finished.
    pub pending_status: Option<InvoiceStatus>,
    /// Issue date.
    pub issue_date: NaiveDate,
    /// Optional due date.
    pub due_date: Option<NaiveDate>,
    /// Set if and only if the invoice is paid.
    pub collection: Option<CollectionRef>,
    /// The ledger transaction materialized for this invoice.
    pub ledger_transaction_id: Option<LedgerTransactionId>,
    /// Free-text notes.
    pub notes: Option<String>,
}

impl Invoice {
    /// Invoice currency.
    #[must_use]
    pub fn currency(&self) -> Currency {
        self.terms.currency
    }

    /// Status as shown to operators; `sent` past its due date reads as overdue.
    #[must_use]
    pub fn display_status(&self, today: NaiveDate) -> DisplayStatus {
        match self.status {
            InvoiceStatus::Sent if self.due_date.is_some_and(|due| due < today) => {
                DisplayStatus::Overdue
            }
            other => other.into(),
        }
    }

    /// Whether line items and terms may still change.
    #[must_use]
    pub fn is_editable(&self) -> bool {
        self.status.is_editable() && self.pending_status.is_none()
    }
}

/// Input for creating a draft invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    /// Requested invoice number; generated when absent or already taken.
    pub number: Option<String>,
    /// Owning client.
    pub client_id: Option<ClientId>,
    /// Line items.
    pub line_items: Vec<LineItem>,
    /// Terms.
    pub terms: InvoiceTerms,
    /// Issue date.
    pub issue_date: NaiveDate,
    /// Due date.
    pub due_date: Option<NaiveDate>,
    /// Notes.
    pub notes: Option<String>,
}

/// Replacement content for an editable invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceEdit {
    /// New line items.
    pub line_items: Vec<LineItem>,
    /// New terms.
    pub terms: InvoiceTerms,
    /// New due date.
    pub due_date: Option<NaiveDate>,
    /// New notes.
    pub notes: Option<String>,
}
