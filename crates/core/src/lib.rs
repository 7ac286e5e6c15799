//! Core business logic for Visadesk.
//!
//! This crate contains the billing engine with no web or database
//! dependencies. Storage is reached only through the traits in
//! [`billing::store`].
//!
//! # Modules
//!
//! - `billing` - Invoice totals, status lifecycle, ledger synchronization and reconciliation

pub mod billing;
