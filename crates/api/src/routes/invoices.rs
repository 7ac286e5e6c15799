//! Invoice routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use visadesk_core::billing::{
    AccountKind, BillingEngine, CollectionDraft, DisplayStatus, Invoice, InvoiceEdit,
    InvoiceStatus, InvoiceTerms, LineBreakdown, LineItem, NewInvoice, PaymentMethod,
};
use visadesk_shared::types::{AccountId, ClientId, InvoiceId};

use crate::AppState;
use crate::error::{bad_request, billing_error_response};

/// Creates the invoice routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/invoices", post(create_invoice))
        .route(
            "/invoices/{id}",
            get(get_invoice).put(update_invoice).delete(delete_invoice),
        )
        .route("/invoices/{id}/status", post(change_status))
}

/// Request body for creating an invoice.
#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    /// Requested invoice number; generated when absent or taken.
    pub number: Option<String>,
    /// Owning client.
    pub client_id: Option<Uuid>,
    /// Line items.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// Currency, tax, discount, stamp duty and withholding.
    #[serde(flatten)]
    pub terms: InvoiceTerms,
    /// Issue date, today when absent.
    pub issue_date: Option<NaiveDate>,
    /// Due date.
    pub due_date: Option<NaiveDate>,
    /// Notes.
    pub notes: Option<String>,
}

/// Request body for replacing an invoice's content.
#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceRequest {
    /// Line items.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// Currency, tax, discount, stamp duty and withholding.
    #[serde(flatten)]
    pub terms: InvoiceTerms,
    /// Due date.
    pub due_date: Option<NaiveDate>,
    /// Notes.
    pub notes: Option<String>,
}

/// Request body for a status change.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    /// Target status: draft, sent, paid or cancelled.
    pub status: String,
    /// Collection account kind, for `paid`.
    pub account_kind: Option<AccountKind>,
    /// Collection account, for `paid`.
    pub account_id: Option<Uuid>,
    /// Payment method, for `paid`.
    pub payment_method: Option<PaymentMethod>,
}

/// An invoice with its derived fields.
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    /// Stored invoice.
    #[serde(flatten)]
    pub invoice: Invoice,
    /// Status as shown to operators.
    pub display_status: DisplayStatus,
    /// Per-line pre-tax and tax split.
    pub lines: Vec<LineBreakdown>,
}

impl InvoiceResponse {
    fn build(engine: &BillingEngine, invoice: Invoice) -> Self {
        Self {
            display_status: invoice.display_status(Utc::now().date_naive()),
            lines: engine.line_breakdown(&invoice),
            invoice,
        }
    }
}

/// POST `/invoices` - Create a draft invoice.
async fn create_invoice(
    State(state): State<AppState>,
    Json(payload): Json<CreateInvoiceRequest>,
) -> impl IntoResponse {
    let new = NewInvoice {
        number: payload.number,
        client_id: payload.client_id.map(ClientId::from_uuid),
        line_items: payload.line_items,
        terms: payload.terms,
        issue_date: payload
            .issue_date
            .unwrap_or_else(|| Utc::now().date_naive()),
        due_date: payload.due_date,
        notes: payload.notes,
    };

    match state.engine.create_invoice(new).await {
        Ok(invoice) => (
            StatusCode::CREATED,
            Json(InvoiceResponse::build(&state.engine, invoice)),
        )
            .into_response(),
        Err(e) => billing_error_response(&e),
    }
}

/// GET `/invoices/{id}` - Fetch an invoice.
async fn get_invoice(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.engine.get_invoice(InvoiceId::from_uuid(id)).await {
        Ok(invoice) => Json(InvoiceResponse::build(&state.engine, invoice)).into_response(),
        Err(e) => billing_error_response(&e),
    }
}

/// PUT `/invoices/{id}` - Replace line items and terms of an editable invoice.
async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateInvoiceRequest>,
) -> impl IntoResponse {
    let edit = InvoiceEdit {
        line_items: payload.line_items,
        terms: payload.terms,
        due_date: payload.due_date,
        notes: payload.notes,
    };

    match state
        .engine
        .update_invoice(InvoiceId::from_uuid(id), edit)
        .await
    {
        Ok(invoice) => Json(InvoiceResponse::build(&state.engine, invoice)).into_response(),
        Err(e) => billing_error_response(&e),
    }
}

/// DELETE `/invoices/{id}` - Administrative delete.
async fn delete_invoice(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.engine.delete_invoice(InvoiceId::from_uuid(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => billing_error_response(&e),
    }
}

/// POST `/invoices/{id}/status` - Move an invoice through its lifecycle.
async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> impl IntoResponse {
    let Some(target) = InvoiceStatus::parse(&payload.status) else {
        return bad_request(
            "INVALID_STATUS",
            format!(
                "Unknown status '{}'. Must be one of: draft, sent, paid, cancelled",
                payload.status
            ),
        );
    };
    let collection = CollectionDraft {
        account_kind: payload.account_kind,
        account_id: payload.account_id.map(AccountId::from_uuid),
        payment_method: payload.payment_method,
    };

    match state
        .engine
        .transition(InvoiceId::from_uuid(id), target, collection)
        .await
    {
        Ok(outcome) => {
            info!(
                invoice_id = %id,
                from = %outcome.from,
                to = %outcome.to,
                "Status change accepted"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "from": outcome.from,
                    "to": outcome.to,
                    "ledger": outcome.ledger,
                    "invoice": InvoiceResponse::build(&state.engine, outcome.invoice),
                })),
            )
                .into_response()
        }
        Err(e) => billing_error_response(&e),
    }
}
