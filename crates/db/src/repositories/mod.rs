//! Repository implementations of the billing store traits.
//!
//! Each repository owns a `DatabaseConnection` and implements one of the
//! `visadesk_core::billing` store traits. Every call is its own database
//! transaction; nothing spans two repositories.

pub mod account;
pub mod archive;
pub mod invoice;
pub mod ledger;

pub use account::AccountRepository;
pub use archive::ArchiveRepository;
pub use invoice::InvoiceRepository;
pub use ledger::LedgerRepository;

use sea_orm::{DbErr, SqlErr};
use std::fmt::Display;
use uuid::Uuid;
use visadesk_core::billing::StoreError;

/// Maps a database error onto the store error the engine understands.
///
/// Unique violations become `Conflict`; everything else is a backend failure.
pub(crate) fn store_error(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Conflict(detail),
        _ => StoreError::Backend(err.to_string()),
    }
}

/// A stored row that does not decode into a domain value.
pub(crate) fn corrupt(entity: &str, id: Uuid, detail: impl Display) -> StoreError {
    StoreError::Backend(format!("corrupt {entity} row {id}: {detail}"))
}

/// Decodes a text column through `parse`, reporting the raw value on failure.
pub(crate) fn decode<T>(
    entity: &str,
    id: Uuid,
    column: &str,
    raw: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, StoreError> {
    parse(raw).ok_or_else(|| corrupt(entity, id, format!("unknown {column} '{raw}'")))
}
