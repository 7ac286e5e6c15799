//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Repositories implementing the billing store traits on PostgreSQL
//! - Database migrations

pub mod entities;
pub mod migration;
pub mod repositories;

pub use repositories::{AccountRepository, ArchiveRepository, InvoiceRepository, LedgerRepository};

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::sync::Arc;
use visadesk_core::billing::EngineStores;
use visadesk_shared::config::DatabaseConfig;

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Establishes a pooled connection sized by `config`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect_with(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .sqlx_logging(false);
    Database::connect(options).await
}

/// Store handles for the billing engine backed by `db`.
#[must_use]
pub fn engine_stores(db: &DatabaseConnection) -> EngineStores {
    EngineStores {
        invoices: Arc::new(InvoiceRepository::new(db.clone())),
        ledger: Arc::new(LedgerRepository::new(db.clone())),
        accounts: Arc::new(AccountRepository::new(db.clone())),
        archive: Arc::new(ArchiveRepository::new(db.clone())),
    }
}
