//! Period close routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};

use crate::AppState;
use crate::error::billing_error_response;

/// Creates the archive routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/archive/{year}/{month}",
        get(list_archived).post(close_period),
    )
}

/// POST `/archive/{year}/{month}` - Archive the finalized invoices of a month.
async fn close_period(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
) -> impl IntoResponse {
    match state.engine.close_period(year, month).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => billing_error_response(&e),
    }
}

/// GET `/archive/{year}/{month}` - Frozen copies taken when the month was closed.
async fn list_archived(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
) -> impl IntoResponse {
    match state.engine.archived(year, month).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => billing_error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::testing::{app, send};

    #[tokio::test]
    async fn test_close_period_archives_finalized() {
        let (app, stores) = app();
        for (issue_date, cancel) in [("2025-11-03", true), ("2025-11-20", false)] {
            let (_, created) = send(
                &app,
                "POST",
                "/api/v1/invoices",
                Some(json!({
                    "currency": "TRY",
                    "issue_date": issue_date,
                    "line_items": [
                        { "description": "Student visa file", "quantity": "1", "unit_price": "700" }
                    ]
                })),
            )
            .await;
            if cancel {
                let uri = format!("/api/v1/invoices/{}/status", created["id"].as_str().unwrap());
                send(&app, "POST", &uri, Some(json!({ "status": "cancelled" }))).await;
            }
        }

        let (status, summary) = send(&app, "POST", "/api/v1/archive/2025/11", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["archived_invoices"], 1);
        assert_eq!(summary["archived_transactions"], 0);
        assert_eq!(summary["skipped"], 1);
        assert_eq!(stores.invoices.len(), 1);

        let (status, records) = send(&app, "GET", "/api/v1/archive/2025/11", None).await;
        assert_eq!(status, StatusCode::OK);
        let records = records.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["kind"], "invoice");
        assert_eq!(records[0]["payload"]["status"], "cancelled");

        let (_, other) = send(&app, "GET", "/api/v1/archive/2025/12", None).await;
        assert_eq!(other, json!([]));
    }

    #[tokio::test]
    async fn test_invalid_month() {
        let (app, _) = app();

        let (status, body) = send(&app, "POST", "/api/v1/archive/2025/13", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_PERIOD");

        let (status, _) = send(&app, "GET", "/api/v1/archive/2025/0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
