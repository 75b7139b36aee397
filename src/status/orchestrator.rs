// =============================================================================
// Analysis Orchestrator: periodic re-analysis + tick-driven price refresh
// =============================================================================
//
// Two loops run concurrently for the whole process:
//
//   Periodic loop:  once per cycle (60s wall clock, drift-compensated) every
//                   watched symbol is analysed at 1m and 5m, its MarketStatus
//                   is re-evaluated and written to `market_status:{symbol}`,
//                   and the market summary is refreshed.
//
//   Tick loop:      consumes `tick_updates:{symbol}` and patches the stored
//                   status's price and timestamp between cycles.
//
// Both loops share nothing in-process; they meet only on the result sink,
// where last writer wins per key. Failures are contained to one symbol or one
// message. Shutdown is observed through a watch channel at every suspension
// point.
//
// The loops are spawned once at startup:
//
//   tokio::spawn(orchestrator.clone().run(shutdown_rx));
//
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::analysis::MarketDataService;
use crate::clock::Clock;
use crate::error::PipelineError;
use crate::market_data::Interval;
use crate::runtime_config::AnalyzerConfig;
use crate::status::evaluator::evaluate;
use crate::status::{MarketStatus, StatusChange};
use crate::store::{get_json, keys, put_json, FeedMessage, PubSub, ResultSink};
use crate::types::TickRecord;

/// Timing and expiry settings for the orchestrator loops.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub cycle_period: Duration,
    pub status_ttl: Duration,
    pub summary_ttl: Duration,
    pub feed_recv_timeout: Duration,
    pub resubscribe_backoff: Duration,
}

impl From<&AnalyzerConfig> for OrchestratorSettings {
    fn from(cfg: &AnalyzerConfig) -> Self {
        Self {
            cycle_period: Duration::from_secs(cfg.cycle_period_secs),
            status_ttl: Duration::from_secs(cfg.status_ttl_secs),
            summary_ttl: Duration::from_secs(cfg.summary_ttl_secs),
            feed_recv_timeout: Duration::from_millis(cfg.feed_recv_timeout_ms),
            resubscribe_backoff: Duration::from_secs(cfg.resubscribe_backoff_secs),
        }
    }
}

/// Counts from one periodic pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub published: usize,
    pub no_data: usize,
    pub failed: usize,
}

pub struct AnalysisOrchestrator {
    service: Arc<MarketDataService>,
    sink: Arc<dyn ResultSink>,
    pubsub: Arc<dyn PubSub>,
    clock: Arc<dyn Clock>,
    symbols: Vec<String>,
    settings: OrchestratorSettings,
}

impl AnalysisOrchestrator {
    pub fn new(
        service: Arc<MarketDataService>,
        sink: Arc<dyn ResultSink>,
        pubsub: Arc<dyn PubSub>,
        clock: Arc<dyn Clock>,
        symbols: Vec<String>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            service,
            sink,
            pubsub,
            clock,
            symbols,
            settings,
        }
    }

    /// Run both loops until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        tokio::join!(
            self.run_periodic(shutdown.clone()),
            self.run_tick_updates(shutdown)
        );
        info!("analysis orchestrator stopped");
    }

    // -------------------------------------------------------------------------
    // Periodic loop
    // -------------------------------------------------------------------------

    pub async fn run_periodic(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            symbols = self.symbols.len(),
            period_secs = self.settings.cycle_period.as_secs(),
            "periodic analysis loop starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            let report = self.run_cycle(&shutdown).await;
            let elapsed = started.elapsed();

            info!(
                published = report.published,
                no_data = report.no_data,
                failed = report.failed,
                elapsed_ms = elapsed.as_millis() as u64,
                "analysis cycle complete"
            );

            let pause = self.settings.cycle_period.saturating_sub(elapsed);
            if sleep_or_shutdown(&mut shutdown, pause).await {
                break;
            }
        }

        info!("periodic analysis loop stopped");
    }

    /// One pass over every watched symbol, then the market summary.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleReport {
        let mut report = CycleReport::default();

        for symbol in &self.symbols {
            if *shutdown.borrow() {
                info!("shutdown requested: abandoning remaining symbols this cycle");
                return report;
            }

            match self.refresh_status(symbol).await {
                Ok(Some(status)) => {
                    debug!(symbol = %symbol, status = %status.status, confidence = status.confidence, "status published");
                    report.published += 1;
                }
                Ok(None) => {
                    debug!(symbol = %symbol, "no 1m data yet: status not published");
                    report.no_data += 1;
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "status refresh failed");
                    report.failed += 1;
                }
            }
        }

        self.publish_summary().await;
        report
    }

    /// Analyse, evaluate and persist the status for one symbol.
    ///
    /// `Ok(None)` when there is no 1m data yet. Analysis or sink failures are
    /// returned; evaluation failures are published as an ERROR status.
    pub async fn refresh_status(&self, symbol: &str) -> Result<Option<MarketStatus>, PipelineError> {
        let one_min = self.service.analyze(symbol, Interval::Minute1).await?;
        let five_min = self.service.analyze(symbol, Interval::Minute5).await?;

        let Some(one_min) = one_min else {
            return Ok(None);
        };

        let now = self.clock.now();
        let status = match evaluate(&one_min, five_min.as_ref(), now) {
            Ok(status) => status,
            Err(e) => {
                warn!(symbol, error = %e, "status evaluation failed");
                MarketStatus::error(symbol, e.to_string(), one_min.current_price, now)
            }
        };

        let key = keys::market_status_key(symbol);
        let previous = self.load_status(&key).await;

        put_json(self.sink.as_ref(), &key, &status, self.settings.status_ttl).await?;

        if let Some(previous) = previous {
            if previous.status != status.status {
                self.emit_change(StatusChange {
                    symbol: symbol.to_string(),
                    old_status: previous.status,
                    new_status: status.status,
                    price: status.current_price,
                    timestamp: now,
                })
                .await;
            }
        }

        Ok(Some(status))
    }

    async fn publish_summary(&self) {
        let summary = self.service.summarize(&self.symbols).await;
        if let Err(e) = put_json(
            self.sink.as_ref(),
            keys::MARKET_SUMMARY_KEY,
            &summary,
            self.settings.summary_ttl,
        )
        .await
        {
            error!(error = %e, "failed to publish market summary");
        }
    }

    /// Previously stored status; unreadable entries count as absent.
    async fn load_status(&self, key: &str) -> Option<MarketStatus> {
        match get_json(self.sink.as_ref(), key).await {
            Ok(status) => status,
            Err(e) => {
                warn!(key, error = %e, "could not read previous status");
                None
            }
        }
    }

    async fn emit_change(&self, change: StatusChange) {
        let topic = keys::status_change_topic(&change.symbol);
        info!(
            symbol = %change.symbol,
            old = %change.old_status,
            new = %change.new_status,
            price = change.price,
            "market status changed"
        );

        let payload = match serde_json::to_string(&change) {
            Ok(p) => p,
            Err(e) => {
                error!(symbol = %change.symbol, error = %e, "failed to encode status change");
                return;
            }
        };
        if let Err(e) = self.pubsub.publish(&topic, payload).await {
            warn!(topic = %topic, error = %e, "failed to publish status change");
        }
    }

    // -------------------------------------------------------------------------
    // Tick loop
    // -------------------------------------------------------------------------

    pub async fn run_tick_updates(&self, mut shutdown: watch::Receiver<bool>) {
        let topics: Vec<String> = self.symbols.iter().map(|s| keys::tick_topic(s)).collect();
        let backoff = self.settings.resubscribe_backoff;

        'subscribe: loop {
            if *shutdown.borrow() {
                break;
            }

            let mut subscription = match self.pubsub.subscribe(&topics).await {
                Ok(sub) => {
                    info!(topics = topics.len(), "subscribed to tick updates");
                    sub
                }
                Err(e) => {
                    error!(error = %e, "tick feed subscribe failed: retrying in {}s", backoff.as_secs());
                    if sleep_or_shutdown(&mut shutdown, backoff).await {
                        break;
                    }
                    continue;
                }
            };

            loop {
                if *shutdown.borrow() {
                    break 'subscribe;
                }

                match subscription.recv_timeout(self.settings.feed_recv_timeout).await {
                    Ok(Some(msg)) => {
                        if let Err(e) = self.handle_tick_message(&msg).await {
                            warn!(topic = %msg.topic, error = %e, "tick update dropped");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(error = %e, "tick feed receive failed: resubscribing in {}s", backoff.as_secs());
                        if sleep_or_shutdown(&mut shutdown, backoff).await {
                            break 'subscribe;
                        }
                        continue 'subscribe;
                    }
                }
            }
        }

        info!("tick update loop stopped");
    }

    /// Patch the stored status for the message's symbol with the tick price.
    ///
    /// Returns the status change event if one was emitted. With price-only
    /// patching the status never changes here, so this is `Ok(None)` in
    /// practice; the comparison stays for a future recompute path.
    pub async fn handle_tick_message(
        &self,
        msg: &FeedMessage,
    ) -> Result<Option<StatusChange>, PipelineError> {
        let symbol = keys::symbol_from_tick_topic(&msg.topic)
            .ok_or_else(|| PipelineError::Malformed(format!("unexpected topic {}", msg.topic)))?;

        let record: TickRecord = serde_json::from_str(&msg.payload)
            .map_err(|e| PipelineError::Malformed(format!("bad tick payload: {e}")))?;
        let tick = record.parse(symbol)?;

        let key = keys::market_status_key(symbol);
        let Some(stored) = get_json::<MarketStatus>(self.sink.as_ref(), &key).await? else {
            debug!(symbol, "no status to patch yet");
            return Ok(None);
        };

        let now = self.clock.now();
        let patched = stored.with_price(tick.price, now);
        put_json(self.sink.as_ref(), &key, &patched, self.settings.status_ttl).await?;
        debug!(symbol, price = tick.price, "status price patched");

        if patched.status != stored.status {
            let change = StatusChange {
                symbol: symbol.to_string(),
                old_status: stored.status,
                new_status: patched.status,
                price: tick.price,
                timestamp: now,
            };
            self.emit_change(change.clone()).await;
            return Ok(Some(change));
        }

        Ok(None)
    }
}

/// Sleep for `pause` unless shutdown is requested first. Returns `true` when
/// the caller should stop; a dropped sender counts as shutdown.
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, pause: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(pause) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
