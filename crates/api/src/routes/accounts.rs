//! Collection account routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;
use visadesk_core::billing::{Account, NewAccount};
use visadesk_shared::types::{AccountId, Currency};

use crate::AppState;
use crate::error::billing_error_response;

/// Creates the account routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(create_account))
        .route("/accounts/{id}", get(get_account))
}

/// An account with its current balance per currency.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// Stored account.
    #[serde(flatten)]
    pub account: Account,
    /// Opening amount plus movement, per currency.
    pub current_balances: BTreeMap<Currency, Decimal>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        let currencies: BTreeSet<Currency> = account
            .initial_amounts
            .keys()
            .chain(account.balances.keys())
            .copied()
            .collect();
        let current_balances = currencies
            .into_iter()
            .map(|currency| (currency, account.current_balance(currency)))
            .collect();
        Self {
            account,
            current_balances,
        }
    }
}

/// POST `/accounts` - Register a cash register or bank account.
async fn create_account(
    State(state): State<AppState>,
    Json(payload): Json<NewAccount>,
) -> impl IntoResponse {
    match state.engine.register_account(payload).await {
        Ok(account) => (StatusCode::CREATED, Json(AccountResponse::from(account))).into_response(),
        Err(e) => billing_error_response(&e),
    }
}

/// GET `/accounts/{id}` - Fetch an account with balances.
async fn get_account(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.engine.account(AccountId::from_uuid(id)).await {
        Ok(account) => Json(AccountResponse::from(account)).into_response(),
        Err(e) => billing_error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    use crate::routes::testing::{app, money, send};

    #[tokio::test]
    async fn test_register_with_opening_amounts() {
        let (app, _) = app();

        let (status, created) = send(
            &app,
            "POST",
            "/api/v1/accounts",
            Some(json!({
                "name": "  Istanbul office till ",
                "kind": "cash_register",
                "initial_amounts": { "TRY": "250.00", "EUR": "40" }
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "Istanbul office till");
        assert_eq!(money(&created["current_balances"]["TRY"]), dec!(250));
        assert_eq!(money(&created["current_balances"]["EUR"]), dec!(40));

        let uri = format!("/api/v1/accounts/{}", created["id"].as_str().unwrap());
        let (status, fetched) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["kind"], "cash_register");
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let (app, _) = app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/accounts",
            Some(json!({ "name": "   ", "kind": "bank_account" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BLANK_ACCOUNT_NAME");
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let (app, _) = app();

        let uri = format!("/api/v1/accounts/{}", Uuid::new_v4());
        let (status, body) = send(&app, "GET", &uri, None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "ACCOUNT_NOT_FOUND");
    }
}
