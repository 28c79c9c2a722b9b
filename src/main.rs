//! leadflow - WhatsApp lead-capture bot
//!
//! Walks each customer of each tenant through a configurable decision tree,
//! persisting progress and replying through the WhatsApp Cloud API.

mod api;
mod config;
mod db;
mod engine;
mod runtime;
mod tree;
mod whatsapp;

use api::{create_router, AppState};
use config::AppConfig;
use db::Database;
use runtime::{BotRuntime, DatabaseStorage, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use whatsapp::WhatsAppClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadflow=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env()?;

    if config.whatsapp.verify_token.is_none() {
        tracing::warn!("WHATSAPP_VERIFY_TOKEN not set; webhook subscription will be refused");
    }
    if config.whatsapp.app_secret.is_empty() {
        tracing::warn!("WHATSAPP_APP_SECRET not set; webhook signatures are not checked");
    }

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // Redeliveries older than the retention window are processed again
    let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(config.dedup_retention_days));
    let purged = db.purge_processed_messages(cutoff)?;
    if purged > 0 {
        tracing::info!(purged, retention_days = config.dedup_retention_days, "Purged processed message ids");
    }

    // Default tree, validated before serving anything
    let default_tree = config.load_default_tree()?;
    tracing::info!(
        source = config
            .default_tree_path
            .as_ref()
            .map_or_else(|| "built-in".to_string(), |p| p.display().to_string()),
        nodes = default_tree.len(),
        "Default tree loaded"
    );

    // Create application state
    let transport: Arc<dyn Transport> = Arc::new(WhatsAppClient::new(&config.whatsapp)?);
    let runtime = BotRuntime::new(
        DatabaseStorage::new(db.clone()),
        transport,
        Arc::new(default_tree),
    );
    let state = AppState::new(db, runtime, config.whatsapp.clone());

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("leadflow listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
