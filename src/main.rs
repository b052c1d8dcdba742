use std::sync::Arc;

use anyhow::{Context, Result};

use paperspot::config::AppConfig;
use paperspot::db::Database;
use paperspot::gateway::{self, state::AppState};
use paperspot::logging::init_logging;
use paperspot::quotes::QuoteBoard;
use paperspot::trading::TradingService;
use paperspot::users::UserStore;

#[tokio::main]
async fn main() -> Result<()> {
    let env = std::env::var("PAPERSPOT_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&config);

    tracing::info!("paperspot starting (env: {})", env);

    let db = Arc::new(
        Database::connect(&config.postgres_url)
            .await
            .context("failed to connect to PostgreSQL")?,
    );
    db.init_schema().await.context("schema bootstrap failed")?;
    UserStore::ensure_system_accounts(db.pool())
        .await
        .context("system equity bootstrap failed")?;

    // The quote board is fed by the external price-feed collaborator
    let quotes = Arc::new(QuoteBoard::new());
    let trading = Arc::new(TradingService::new(db.pool().clone(), quotes));
    trading
        .recover_books()
        .await
        .context("order book recovery failed")?;

    let state = Arc::new(AppState {
        trading,
        db: db.clone(),
    });
    let app = gateway::router(state);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("paperspot stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {}", e);
        return;
    }
    tracing::info!("shutdown signal received");
}
