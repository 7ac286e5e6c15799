//! Visadesk API Server
//!
//! Main entry point for the Visadesk billing service.

use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use visadesk_api::{AppState, create_router};
use visadesk_core::billing::{BillingEngine, EngineSettings};
use visadesk_db::{connect_with, engine_stores, migration::Migrator};
use visadesk_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visadesk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load()?;

    // Connect to database and bring the schema up to date
    let db = connect_with(&config.database).await?;
    info!("Connected to database");
    Migrator::up(&db, None).await?;

    let engine = BillingEngine::new(engine_stores(&db), EngineSettings::from(&config.billing));

    // Repair whatever a previous crash left behind before taking traffic
    if config.billing.reconcile_on_startup {
        let report = engine.reconcile().await?;
        if report.is_clean() {
            info!(scanned = report.scanned, "Startup reconciliation clean");
        } else {
            warn!(
                scanned = report.scanned,
                corrections = report.corrections.len(),
                manual = report.manual.len(),
                failures = report.failures.len(),
                "Startup reconciliation found inconsistencies"
            );
        }
    }

    // Create router
    let app = create_router(AppState::new(engine));

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
