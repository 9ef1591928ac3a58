mod config;
mod phone;
mod resolver;
mod store;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::store::Store;
use crate::webhook::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,parish_sms=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Bind address: {}", config.server.bind);
    info!("  Database: {}", config.storage.database_path.display());
    info!(
        "  Broadcast title prefix: {:?}",
        config.sms.broadcast_title_prefix
    );
    info!("  History scan limit: {}", config.sms.history_scan_limit);

    // Open the store
    let store = Store::open(&config.storage.database_path)?;

    // Bind and serve the webhook
    let bind = config.server.bind.clone();
    let state = AppState {
        store,
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;

    info!("Webhook listening on {bind}");
    axum::serve(listener, webhook::router(state))
        .await
        .context("Server error")?;

    Ok(())
}
