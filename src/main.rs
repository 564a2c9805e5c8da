// =============================================================================
// candlestream — Main Entry Point
// =============================================================================
//
// Ingests a live trade tick feed over WebSocket, aggregates OHLC candles per
// symbol and per configured granularity, and serves them over a REST API.
// =============================================================================

mod api;
mod config;
mod feed;
mod market;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ServiceConfig;
use crate::market::MarketRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("candlestream starting up");

    let config_path =
        std::env::var("CANDLESTREAM_CONFIG").unwrap_or_else(|_| "candlestream.json".into());
    let mut config = ServiceConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, path = %config_path, "failed to load config, using defaults");
        ServiceConfig::default()
    });

    if let Ok(addr) = std::env::var("CANDLESTREAM_BIND_ADDR") {
        config.bind_addr = addr;
    }
    if let Ok(url) = std::env::var("CANDLESTREAM_FEED_URL") {
        config.feed_url = url;
    }

    let granularities = config.granularities()?;
    info!(
        count = granularities.len(),
        candles = ?config.candles,
        "configured candle granularities"
    );

    // ── 2. Build the market registry ─────────────────────────────────────
    let registry = Arc::new(MarketRegistry::new(granularities));

    // ── 3. Tick feed with reconnection ───────────────────────────────────
    let feed_registry = registry.clone();
    let feed_url = config.feed_url.clone();
    tokio::spawn(async move {
        loop {
            if let Err(e) = feed::run_feed_stream(&feed_url, &feed_registry).await {
                error!(error = %e, "tick feed error — reconnecting in 5s");
            }
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
        }
    });

    // ── 4. REST API server ───────────────────────────────────────────────
    let api_registry = registry.clone();
    let bind_addr = config.bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_registry);
        match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => {
                info!(addr = %bind_addr, "API server listening");
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "API server failed");
                }
            }
            Err(e) => error!(addr = %bind_addr, error = %e, "failed to bind API server"),
        }
    });

    info!("all subsystems running, press Ctrl+C to stop");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping");

    Ok(())
}
