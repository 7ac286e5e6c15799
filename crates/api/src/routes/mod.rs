//! API route definitions.

use axum::Router;

use crate::AppState;

pub mod accounts;
pub mod archive;
pub mod health;
pub mod invoices;
pub mod reconcile;
pub mod totals;

/// Creates the API router with all routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(invoices::routes())
        .merge(totals::routes())
        .merge(accounts::routes())
        .merge(reconcile::routes())
        .merge(archive::routes())
}
