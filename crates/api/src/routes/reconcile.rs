//! Reconciliation route.

use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};

use crate::AppState;
use crate::error::billing_error_response;

/// Creates the reconciliation routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/reconcile", post(run_reconcile))
}

/// POST `/reconcile` - Run one repair sweep and report what it did.
async fn run_reconcile(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.reconcile().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => billing_error_response(&e),
    }
}
