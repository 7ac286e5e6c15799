//! Totals preview route.

use axum::{
    Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post,
};
use serde::Deserialize;
use serde_json::json;
use visadesk_core::billing::{InvoiceTerms, LineItem, TotalsCalculator};

use crate::AppState;
use crate::error::billing_error_response;

/// Creates the totals routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/totals", post(compute_totals))
}

/// Line items and terms to price.
#[derive(Debug, Deserialize)]
pub struct TotalsRequest {
    /// Line items.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// Currency, tax, discount, stamp duty and withholding.
    #[serde(flatten)]
    pub terms: InvoiceTerms,
}

/// POST `/totals` - Price an invoice without storing it.
async fn compute_totals(
    State(state): State<AppState>,
    Json(payload): Json<TotalsRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .compute_totals(&payload.line_items, &payload.terms)
    {
        Ok(totals) => {
            let lines: Vec<_> = payload
                .line_items
                .iter()
                .map(|item| TotalsCalculator::line_breakdown(item, &payload.terms))
                .collect();
            (
                StatusCode::OK,
                Json(json!({
                    "totals": totals,
                    "lines": lines,
                })),
            )
                .into_response()
        }
        Err(e) => billing_error_response(&e),
    }
}
