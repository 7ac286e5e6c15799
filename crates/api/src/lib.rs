//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - REST routes over the billing engine
//! - Mapping of billing errors to JSON error responses
//!
//! Authentication and authorization happen upstream of this service.

pub mod error;
pub mod routes;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use visadesk_core::billing::BillingEngine;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The billing engine.
    pub engine: Arc<BillingEngine>,
}

impl AppState {
    /// Wraps an engine.
    #[must_use]
    pub fn new(engine: BillingEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
