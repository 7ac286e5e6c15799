//! Invoice lifecycle and ledger reconciliation.
//!
//! An invoice, its ledger transaction and the balance of the account it was
//! collected into live in independent stores. This module keeps them
//! consistent through ordered steps, idempotent balance adjustments and a
//! reconciliation sweep.
//!
//! - [`TotalsCalculator`] computes totals from line items and terms
//! - [`InvoiceStatusMachine`] decides which transitions are legal
//! - [`LedgerSynchronizer`] creates and removes the ledger transaction
//! - [`BalanceAdjuster`] applies signed deltas to account balances
//! - [`DraftReconciler`] repairs state left by interrupted operations
//! - [`BillingEngine`] ties them together behind per-invoice locks

pub mod archive;
pub mod balance;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod memory;
pub mod numbering;
pub mod reconcile;
pub mod records;
pub mod status;
pub mod store;
pub mod totals;
pub mod transition;
pub mod types;

#[cfg(test)]
mod engine_props;
#[cfg(test)]
mod status_props;
#[cfg(test)]
mod totals_props;

pub use archive::{ArchiveSummary, Archiver};
pub use balance::BalanceAdjuster;
pub use engine::{BillingEngine, EngineSettings};
pub use error::{BillingError, StoreError};
pub use ledger::{CreditState, Dematerialization, LedgerSynchronizer, Materialization};
pub use locks::{KeyGuard, LockRegistry};
pub use memory::MemoryStores;
pub use numbering::InvoiceNumberSequence;
pub use reconcile::{
    Correction, DraftReconciler, ManualReason, ManualRepair, RepairAction, RepairFailure,
    RepairReport,
};
pub use records::{
    Account, AdjustmentKey, AdjustmentKind, ArchiveKind, ArchiveRecord, BalanceApplication,
    Direction, LedgerTransaction, NewAccount,
};
pub use status::{DisplayStatus, InvoiceStatus, InvoiceStatusMachine, LedgerEffect, TransitionPlan};
pub use store::{AccountStore, ArchiveStore, EngineStores, InvoiceStore, LedgerStore};
pub use totals::{FeeSchedule, TotalsCalculator};
pub use transition::{LedgerChange, TransitionExecutor, TransitionOutcome};
pub use types::{
    AccountKind, CollectionDraft, CollectionRef, Invoice, InvoiceEdit, InvoiceTerms,
    LineBreakdown, LineItem, NewInvoice, PaymentMethod, TaxConfig, Totals, WithholdingConfig,
};
