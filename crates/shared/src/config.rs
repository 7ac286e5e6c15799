//! Application configuration management.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::AppResult;
use crate::types::Currency;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Billing engine configuration.
    #[serde(default)]
    pub billing: BillingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Billing engine configuration.
///
/// Stamp duty and withholding only ever apply to invoices issued in
/// `local_currency`.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// The agency's local currency.
    #[serde(default = "default_local_currency")]
    pub local_currency: Currency,
    /// Fixed stamp-duty fee added to flagged local-currency invoices.
    #[serde(default)]
    pub stamp_duty_amount: Decimal,
    /// Withholding is only computed when the invoice total exceeds this amount.
    #[serde(default = "default_withholding_threshold")]
    pub withholding_threshold: Decimal,
    /// How long a request waits for an invoice or account lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Optimistic retries for a balance update that lost a version race.
    #[serde(default = "default_balance_retry_limit")]
    pub balance_retry_limit: u32,
    /// Run the reconcile sweep when the server starts.
    #[serde(default = "default_true")]
    pub reconcile_on_startup: bool,
    /// Prefix for generated invoice numbers.
    #[serde(default = "default_invoice_number_prefix")]
    pub invoice_number_prefix: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            local_currency: default_local_currency(),
            stamp_duty_amount: Decimal::ZERO,
            withholding_threshold: default_withholding_threshold(),
            lock_timeout_ms: default_lock_timeout_ms(),
            balance_retry_limit: default_balance_retry_limit(),
            reconcile_on_startup: true,
            invoice_number_prefix: default_invoice_number_prefix(),
        }
    }
}

fn default_local_currency() -> Currency {
    Currency::Try
}

fn default_withholding_threshold() -> Decimal {
    Decimal::ONE_THOUSAND
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_balance_retry_limit() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_invoice_number_prefix() -> String {
    "INV-".to_string()
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> AppResult<Self> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("VISADESK").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
