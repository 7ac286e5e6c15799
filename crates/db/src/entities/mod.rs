//! `SeaORM` entity definitions.

pub mod account_balances;
pub mod accounts;
pub mod archive_records;
pub mod balance_adjustments;
pub mod invoices;
pub mod ledger_transactions;
