//! Billing error types.
//!
//! Validation and precondition errors are raised before any write.
//! `BalanceUpdateFailure` and `LockTimeout` are retryable.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;
use visadesk_shared::types::{AccountId, InvoiceId};

use super::status::InvoiceStatus;
use super::types::AccountKind;

/// Errors returned by persistence adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Record type.
        entity: &'static str,
        /// Record id.
        id: Uuid,
    },

    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An optimistic version check failed.
    #[error("Concurrent modification of {0}")]
    ConcurrentModification(Uuid),

    /// The backing store failed.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors that can occur in the billing engine.
#[derive(Debug, Error)]
pub enum BillingError {
    // ========== Validation Errors ==========
    /// A line item has no description.
    #[error("Line {line}: description is required")]
    EmptyDescription {
        /// Zero-based line index.
        line: usize,
    },

    /// A line item has a negative quantity.
    #[error("Line {line}: quantity cannot be negative ({value})")]
    NegativeQuantity {
        /// Zero-based line index.
        line: usize,
        /// Offending value.
        value: Decimal,
    },

    /// A line item has a negative unit price.
    #[error("Line {line}: unit price cannot be negative ({value})")]
    NegativeUnitPrice {
        /// Zero-based line index.
        line: usize,
        /// Offending value.
        value: Decimal,
    },

    /// Tax rate outside `[0, 1]`.
    #[error("Tax rate must be between 0 and 1, got {0}")]
    InvalidTaxRate(Decimal),

    /// Withholding rate outside `[0, 1]`.
    #[error("Withholding rate must be between 0 and 1, got {0}")]
    InvalidWithholdingRate(Decimal),

    /// Negative discount.
    #[error("Discount cannot be negative ({0})")]
    NegativeDiscount(Decimal),

    /// Due date before issue date.
    #[error("Due date cannot be before the issue date")]
    DueBeforeIssue,

    /// Invoice number is blank.
    #[error("Invoice number cannot be blank")]
    BlankInvoiceNumber,

    /// Account name is blank.
    #[error("Account name cannot be blank")]
    BlankAccountName,

    /// A quantity, price or their sums exceed the representable range.
    #[error("Line {line}: amount out of range")]
    AmountOutOfRange {
        /// Zero-based line index.
        line: usize,
    },

    /// Archive period out of range.
    #[error("Invalid period {year}-{month}")]
    InvalidPeriod {
        /// Year.
        year: i32,
        /// Month.
        month: u32,
    },

    // ========== Precondition Errors ==========
    /// Marking as paid needs a complete collection reference.
    #[error("Collection reference required; missing: {}", missing.join(", "))]
    CollectionReferenceRequired {
        /// Names of the missing fields.
        missing: Vec<&'static str>,
    },

    /// The collection reference names an account that does not exist.
    #[error("Collection account {0} does not exist")]
    UnknownCollectionAccount(AccountId),

    /// The collection reference names an account of another kind.
    #[error("Account {account_id} is a {actual}, not a {expected}")]
    CollectionAccountKindMismatch {
        /// Account referenced.
        account_id: AccountId,
        /// Kind named by the reference.
        expected: AccountKind,
        /// Kind of the stored account.
        actual: AccountKind,
    },

    // ========== State Errors ==========
    /// The status machine does not allow this move.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: InvoiceStatus,
        /// Requested status.
        to: InvoiceStatus,
    },

    /// An earlier undo of "paid" has not finished.
    #[error("Invoice has an unfinished transition to {pending}")]
    TransitionPending {
        /// Status the unfinished transition targets.
        pending: InvoiceStatus,
    },

    /// No generated invoice number is left for this prefix and year.
    #[error("Invoice numbers exhausted for {stem}")]
    InvoiceNumbersExhausted {
        /// Prefix and year, e.g. `INV-2026-`.
        stem: String,
    },

    /// Only draft and sent invoices can be edited.
    #[error("Invoice in status {0} cannot be edited")]
    InvoiceLocked(InvoiceStatus),

    /// Invoice not found.
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    // ========== Retryable Errors ==========
    /// Applying a balance delta failed; any ledger entry created for it was rolled back.
    #[error("Balance update failed for account {account_id}: {reason}")]
    BalanceUpdateFailure {
        /// Account that could not be updated.
        account_id: AccountId,
        /// Cause.
        reason: String,
    },

    /// A lock could not be acquired in time.
    #[error("Timed out waiting for {resource} lock {key}")]
    LockTimeout {
        /// Lock family.
        resource: &'static str,
        /// Locked id.
        key: Uuid,
    },

    // ========== Consistency Errors ==========
    /// Stored records contradict each other in a way that cannot be repaired automatically.
    #[error("Inconsistent state for invoice {invoice_id}: {detail}")]
    InconsistentState {
        /// Affected invoice.
        invoice_id: InvoiceId,
        /// What is wrong.
        detail: String,
    },

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BillingError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyDescription { .. } => "EMPTY_DESCRIPTION",
            Self::NegativeQuantity { .. } => "NEGATIVE_QUANTITY",
            Self::NegativeUnitPrice { .. } => "NEGATIVE_UNIT_PRICE",
            Self::InvalidTaxRate(_) => "INVALID_TAX_RATE",
            Self::InvalidWithholdingRate(_) => "INVALID_WITHHOLDING_RATE",
            Self::NegativeDiscount(_) => "NEGATIVE_DISCOUNT",
            Self::AmountOutOfRange { .. } => "AMOUNT_OUT_OF_RANGE",
            Self::DueBeforeIssue => "DUE_BEFORE_ISSUE",
            Self::BlankInvoiceNumber => "BLANK_INVOICE_NUMBER",
            Self::BlankAccountName => "BLANK_ACCOUNT_NAME",
            Self::InvalidPeriod { .. } => "INVALID_PERIOD",
            Self::CollectionReferenceRequired { .. } => "COLLECTION_REFERENCE_REQUIRED",
            Self::UnknownCollectionAccount(_) => "UNKNOWN_COLLECTION_ACCOUNT",
            Self::CollectionAccountKindMismatch { .. } => "COLLECTION_ACCOUNT_KIND_MISMATCH",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::TransitionPending { .. } => "TRANSITION_PENDING",
            Self::InvoiceNumbersExhausted { .. } => "INVOICE_NUMBERS_EXHAUSTED",
            Self::InvoiceLocked(_) => "INVOICE_LOCKED",
            Self::InvoiceNotFound(_) => "INVOICE_NOT_FOUND",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::BalanceUpdateFailure { .. } => "BALANCE_UPDATE_FAILURE",
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::InconsistentState { .. } => "INCONSISTENT_STATE",
            Self::Store(StoreError::Conflict(_)) => "CONFLICT",
            Self::Store(StoreError::ConcurrentModification(_)) => "CONCURRENT_MODIFICATION",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::EmptyDescription { .. }
            | Self::NegativeQuantity { .. }
            | Self::NegativeUnitPrice { .. }
            | Self::InvalidTaxRate(_)
            | Self::InvalidWithholdingRate(_)
            | Self::NegativeDiscount(_)
            | Self::AmountOutOfRange { .. }
            | Self::DueBeforeIssue
            | Self::BlankInvoiceNumber
            | Self::BlankAccountName
            | Self::InvalidPeriod { .. } => 400,

            // 404 Not Found
            Self::InvoiceNotFound(_) | Self::AccountNotFound(_) => 404,

            // 409 Conflict - state and concurrency errors
            Self::InvalidTransition { .. }
            | Self::TransitionPending { .. }
            | Self::InvoiceNumbersExhausted { .. }
            | Self::InvoiceLocked(_)
            | Self::Store(StoreError::Conflict(_) | StoreError::ConcurrentModification(_)) => 409,

            // 422 Unprocessable - precondition errors the operator can fix
            Self::CollectionReferenceRequired { .. }
            | Self::UnknownCollectionAccount(_)
            | Self::CollectionAccountKindMismatch { .. } => 422,

            // 503 Service Unavailable - retry later
            Self::BalanceUpdateFailure { .. } | Self::LockTimeout { .. } => 503,

            // 500 Internal Server Error
            Self::InconsistentState { .. } | Self::Store(_) => 500,
        }
    }

    /// Returns true if the caller may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BalanceUpdateFailure { .. }
                | Self::LockTimeout { .. }
                | Self::TransitionPending { .. }
                | Self::Store(StoreError::ConcurrentModification(_))
        )
    }
}
