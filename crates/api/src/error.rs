//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use visadesk_core::billing::BillingError;

/// Renders a billing error as `{"error": <code>, "message": <text>}`.
///
/// Server-side failures are logged and their details withheld.
pub fn billing_error_response(err: &BillingError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let message = if status.is_server_error() && !err.is_retryable() {
        tracing::error!(error = %err, code = err.error_code(), "Request failed");
        "An internal error occurred".to_string()
    } else {
        if err.is_retryable() {
            tracing::warn!(error = %err, code = err.error_code(), "Retryable failure");
        }
        err.to_string()
    };

    (
        status,
        Json(json!({
            "error": err.error_code(),
            "message": message,
        })),
    )
        .into_response()
}

/// A 400 response for a request the handler could not interpret.
pub fn bad_request(code: &str, message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
