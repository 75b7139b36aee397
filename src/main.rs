// =============================================================================
// Market Pulse — Main Entry Point
// =============================================================================
//
// Wires the in-process tick store, result sink and pub/sub hub, then runs the
// analysis orchestrator, the optional tick feed bridge and the read API until
// Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod analysis;
mod api;
mod clock;
mod error;
mod indicators;
mod market_data;
mod runtime_config;
mod status;
mod store;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::{MarketDataService, ServiceSettings};
use crate::clock::{Clock, SystemClock};
use crate::market_data::TickIngest;
use crate::runtime_config::AnalyzerConfig;
use crate::status::{AnalysisOrchestrator, OrchestratorSettings};
use crate::store::{BroadcastHub, MemorySink, MemoryTickStore, ResultSink};

const DEFAULT_CONFIG_PATH: &str = "analyzer_config.json";
const FEED_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const SINK_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Market Pulse starting up");

    let config_path =
        std::env::var("PULSE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = AnalyzerConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AnalyzerConfig::default()
    });
    config.apply_overrides(|name| std::env::var(name).ok());
    config.validate().context("invalid analyzer configuration")?;

    info!(symbols = ?config.symbols, "Watching symbols");

    // ── 2. Collaborators ─────────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tick_store = Arc::new(MemoryTickStore::new(config.tick_retention));
    let sink = Arc::new(MemorySink::new(clock.clone()));
    let hub = Arc::new(BroadcastHub::new());

    sink.ping()
        .await
        .context("result sink unreachable at startup")?;

    // ── 3. Tick feed bridge ──────────────────────────────────────────────
    match config.feed_url.clone() {
        Some(url) => {
            let ingest = Arc::new(TickIngest::new(
                tick_store.clone(),
                hub.clone(),
                &config.symbols,
            ));
            tokio::spawn(async move {
                loop {
                    if let Err(e) = market_data::tick_ingest::run_tick_stream(&url, &ingest).await {
                        error!(url = %url, error = %e, "Tick feed error — reconnecting in 5s");
                    }
                    tokio::time::sleep(FEED_RECONNECT_DELAY).await;
                }
            });
        }
        None => warn!("No feed_url configured — expecting ticks from another producer"),
    }

    // ── 4. Start the API server ──────────────────────────────────────────
    let api_state = Arc::new(api::rest::ApiState {
        sink: sink.clone(),
        clock: clock.clone(),
    });
    let bind_addr = config.bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "Failed to bind API server");
                return;
            }
        };
        info!(addr = %bind_addr, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 5. Sink housekeeping ─────────────────────────────────────────────
    let purge_sink = sink.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SINK_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge_sink.purge_expired();
            if purged > 0 {
                debug!(purged, "expired sink entries purged");
            }
        }
    });

    // ── 6. Analysis orchestrator ─────────────────────────────────────────
    let service = Arc::new(MarketDataService::new(
        tick_store.clone(),
        sink.clone(),
        clock.clone(),
        ServiceSettings::from(&config),
    ));
    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        service,
        sink.clone(),
        hub.clone(),
        clock.clone(),
        config.symbols.clone(),
        OrchestratorSettings::from(&config),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let orchestrator_task = tokio::spawn(orchestrator.run(shutdown_rx));

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(config.shutdown_grace_secs);
    match tokio::time::timeout(grace, orchestrator_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "orchestrator task panicked"),
        Err(_) => warn!(grace_secs = grace.as_secs(), "orchestrator did not stop within grace period"),
    }

    info!("Market Pulse shut down complete.");
    Ok(())
}
