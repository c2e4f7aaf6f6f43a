use std::net::SocketAddr;
use std::time::Duration;

use dynavo_api::app::app;
use dynavo_api::config;
use dynavo_api::database::DatabaseManager;
use dynavo_api::dynamic::{connection, ConnectionCache};
use dynavo_api::middleware::rate_limit;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dynavo_api=info,tower_http=info")),
        )
        .init();

    let config = config::config();
    tracing::info!("Starting Dynavo API in {:?} mode", config.environment);

    if dynavo_api::is_production!()
        && (config.security.jwt_secret.is_empty() || config.security.encryption_key.is_empty())
    {
        anyhow::bail!("JWT_SECRET and ENCRYPTION_KEY must be set in production");
    }

    // Serve degraded rather than exit; /health reports the failure
    if let Err(e) = DatabaseManager::migrate().await {
        tracing::error!("Platform database unavailable at startup: {}", e);
    }

    connection::spawn_sweeper(Duration::from_secs(config.mongo.sweep_interval_secs));
    rate_limit::spawn_sweeper(Duration::from_secs(config.api.rate_limit_window_secs.clamp(60, 3600)));

    // Allow tests or deployments to override port via env
    let port = std::env::var("DYNAVO_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Dynavo API listening on http://{}", bind_addr);

    axum::serve(listener, app().into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ConnectionCache::global().close_all().await;
    DatabaseManager::close_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
