// =============================================================================
// Chart Feed: Main Entry Point
// =============================================================================
//
// Loads the instrument list and the configured startup selection, then serves
// the live chart view over REST + WebSocket until Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod coingecko;
mod composer;
mod error;
mod fetch;
mod indicators;
mod live;
mod market_data;
mod runtime_config;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::coingecko::CoinGeckoClient;
use crate::market_data::MarketDataApi;
use crate::runtime_config::RuntimeConfig;

const DEFAULT_CONFIG_PATH: &str = "chart_feed.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Chart feed starting up");

    let config_path =
        std::env::var("CHART_FEED_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    if let Ok(addr) = std::env::var("CHART_FEED_BIND_ADDR") {
        config.bind_addr = addr;
    }
    if let Ok(instrument) = std::env::var("CHART_FEED_INSTRUMENT") {
        let instrument = instrument.trim().to_lowercase();
        if !instrument.is_empty() {
            config.default_instrument = instrument;
        }
    }

    info!(
        api = %config.api_base_url,
        instrument = %config.default_instrument,
        timeframe = %config.default_timeframe,
        live = config.default_live_enabled,
        refresh_ms = config.live_refresh_interval_ms,
        max_attempts = config.retry.max_attempts,
        retry_budget_ms = config.retry_policy().worst_case_delay().as_millis() as u64,
        "Configuration resolved"
    );

    // ── 2. Provider client & shared state ────────────────────────────────
    let client: Arc<dyn MarketDataApi> =
        Arc::new(CoinGeckoClient::new(&config).context("failed to build market data client")?);
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, client));

    // ── 3. Instrument list (background) ──────────────────────────────────
    let list_state = state.clone();
    tokio::spawn(async move {
        let count = list_state.reload_instruments().await;
        let source = list_state.instruments.read().source;
        info!(count, source = ?source, "Instrument list ready");
    });

    // ── 4. Startup selection ─────────────────────────────────────────────
    let selection = state.default_selection();
    let epoch = state.session.select(selection);
    info!(epoch = %epoch, "Initial chart load started");

    // ── 5. API server ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping gracefully");

    state.session.shutdown();
    state.persist_selection();
    if let Err(e) = state.runtime_config.read().save(&config_path) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Chart feed shut down complete.");
    Ok(())
}
