// =============================================================================
// Memepulse Radar — Main Entry Point
// =============================================================================
//
// Wires together the five core components (spec §2): RateLimiter + Cache are
// shared singletons; DataCollector and Sentinel are independent producers;
// Orchestrator is the single consumer that owns process-wide pipeline state.
// The axum server exposes the read APIs and WebSocket subscriber surface
// (§6) over that same Orchestrator handle.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alerts;
mod api;
mod cache;
mod data_collector;
mod events;
mod http_fetcher;
mod orchestrator;
mod rate_limiter;
mod runtime_config;
mod scorer;
mod security_auditor;
mod sentinel;
mod sources;
mod types;

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::alerts::LoggingAlertSink;
use crate::data_collector::DataCollector;
use crate::events::{listing_channel, pair_update_channel};
use crate::orchestrator::Orchestrator;
use crate::rate_limiter::RateLimiter;
use crate::runtime_config::RuntimeConfig;
use crate::security_auditor::SecurityAuditor;
use crate::sentinel::Sentinel;

const CONFIG_PATH: &str = "radar_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Memepulse Radar — Starting Up                  ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load runtime config, using defaults");
        RuntimeConfig::default()
    });
    let bind_addr = config.bind_addr.clone();
    info!(
        chains = ?config.chains,
        refresh_ms = config.refresh_ms,
        sentinel_refresh_ms = config.sentinel_refresh_ms,
        radar_only = config.radar_only,
        "radar configured"
    );
    let config = Arc::new(RwLock::new(config));

    // ── 2. Shared singletons ─────────────────────────────────────────────
    let rate_limiter = Arc::new(RateLimiter::new());

    // ── 3. Event channels ─────────────────────────────────────────────────
    let (pair_tx, pair_rx) = pair_update_channel();
    let (listing_tx, listing_rx) = listing_channel();

    // ── 4. DataCollector (discovery + polling, per chain) ────────────────
    let data_collector = Arc::new(DataCollector::new(
        rate_limiter.clone(),
        config.clone(),
        pair_tx,
    ));
    data_collector.clone().spawn_all();
    info!("DataCollector discovery/poll loops launched");

    // ── 5. SecurityAuditor (cached, concurrency-capped) ──────────────────
    let security = Arc::new(SecurityAuditor::new(
        data_collector.cache(),
        config.clone(),
        rate_limiter.clone(),
    ));

    // ── 6. Sentinel (staggered per-exchange announcement watchers) ──────
    let sentinel = Arc::new(Sentinel::new(rate_limiter.clone(), config.clone(), listing_tx));
    sentinel.clone().spawn_all();
    info!("Sentinel exchange watchers launched");

    // ── 7. Orchestrator (pipeline glue) ──────────────────────────────────
    let alert_sink = Arc::new(LoggingAlertSink::new());
    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        security,
        data_collector,
        sentinel,
        rate_limiter,
        alert_sink,
    ));
    orchestrator.clone().spawn_all(pair_rx, listing_rx);
    info!("Orchestrator pipeline/listing consumers launched");

    // ── 8. API server ─────────────────────────────────────────────────────
    let api_orchestrator = orchestrator.clone();
    let bind_addr_clone = bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_orchestrator);
        let listener = match tokio::net::TcpListener::bind(&bind_addr_clone).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr_clone, error = %e, "failed to bind API server");
                return;
            }
        };
        info!(addr = %bind_addr_clone, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server exited with error");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 9. Graceful shutdown ──────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    if let Err(e) = config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Memepulse Radar shut down complete.");
    Ok(())
}
