// =============================================================================
// Tick Ingest — WebSocket tick feed into the store and the tick topics
// =============================================================================
//
// Frames are JSON ticks:
//
//   { "symbol": "005930", "price": 71200.0, "volume": 15, "timestamp": "2024-03-04T09:01:30Z" }
//
// Each accepted tick is appended to the tick store (which also records it as
// the latest quote) and republished on `tick_updates:{symbol}` so the
// orchestrator's tick loop can refresh the stored status price.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::runtime_config::normalize_symbol;
use crate::store::{keys, MemoryTickStore, PubSub};
use crate::types::{Tick, TickRecord};

#[derive(Debug, Deserialize)]
struct TickFrame {
    symbol: String,
    price: f64,
    #[serde(default)]
    volume: u64,
    timestamp: String,
}

/// Routes decoded ticks for the watched symbols.
pub struct TickIngest {
    store: Arc<MemoryTickStore>,
    pubsub: Arc<dyn PubSub>,
    watched: HashSet<String>,
    accepted: AtomicU64,
    ignored: AtomicU64,
}

impl TickIngest {
    pub fn new(store: Arc<MemoryTickStore>, pubsub: Arc<dyn PubSub>, symbols: &[String]) -> Self {
        Self {
            store,
            pubsub,
            watched: symbols.iter().map(|s| normalize_symbol(s)).collect(),
            accepted: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
        }
    }

    /// Handle one text frame. Returns the tick when it was stored and
    /// republished, `None` when its symbol is not watched.
    pub async fn ingest_frame(&self, text: &str) -> Result<Option<Tick>, PipelineError> {
        let tick = parse_tick_frame(text)?;
        if !self.watched.contains(&tick.symbol) {
            self.ignored.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        self.store.append(&tick);
        let payload = serde_json::to_string(&TickRecord::from(&tick))?;
        let receivers = self
            .pubsub
            .publish(&keys::tick_topic(&tick.symbol), payload)
            .await?;
        self.accepted.fetch_add(1, Ordering::Relaxed);
        debug!(symbol = %tick.symbol, price = tick.price, receivers, "tick ingested");

        Ok(Some(tick))
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }
}

/// Decode and validate a tick frame.
pub fn parse_tick_frame(text: &str) -> Result<Tick, PipelineError> {
    let frame: TickFrame = serde_json::from_str(text)
        .map_err(|e| PipelineError::Malformed(format!("bad tick frame: {e}")))?;
    let symbol = normalize_symbol(&frame.symbol);
    if symbol.is_empty() {
        return Err(PipelineError::Malformed("tick frame without symbol".into()));
    }
    if frame.price <= 0.0 {
        return Err(PipelineError::Malformed(format!(
            "non-positive price {} for {symbol}",
            frame.price
        )));
    }

    TickRecord {
        price: frame.price,
        volume: frame.volume,
        timestamp: frame.timestamp,
    }
    .parse(&symbol)
}

// ---------------------------------------------------------------------------
// WebSocket stream
// ---------------------------------------------------------------------------

/// Connect to the tick feed at `url` and feed frames into `ingest`.
///
/// Runs until the stream disconnects or an error occurs, then returns so that
/// the caller (main.rs) can handle reconnection.
pub async fn run_tick_stream(url: &str, ingest: &Arc<TickIngest>) -> Result<()> {
    info!(url = %url, "connecting to tick feed");

    let (ws_stream, _response) = connect_async(url)
        .await
        .context("failed to connect to tick feed")?;

    info!(url = %url, "tick feed connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = ingest.ingest_frame(&text).await {
                    warn!(error = %e, "tick frame dropped");
                }
            }
            Some(Ok(Message::Close(_))) => {
                warn!(url = %url, "tick feed closed by server");
                return Ok(());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!(url = %url, error = %e, "tick feed read error");
                return Err(e.into());
            }
            None => {
                warn!(
                    url = %url,
                    accepted = ingest.accepted(),
                    ignored = ingest.ignored(),
                    "tick feed stream ended"
                );
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BroadcastHub, Subscription, TickStore};
    use std::time::Duration;

    fn ingest(hub: Arc<BroadcastHub>) -> (TickIngest, Arc<MemoryTickStore>) {
        let store = Arc::new(MemoryTickStore::new(100));
        let ingest = TickIngest::new(store.clone(), hub, &["005930".to_string()]);
        (ingest, store)
    }

    #[test]
    fn parses_valid_frame() {
        let tick = parse_tick_frame(
            r#"{"symbol":"005930","price":71200.0,"volume":15,"timestamp":"2024-03-04T09:01:30Z"}"#,
        )
        .unwrap();
        assert_eq!(tick.symbol, "005930");
        assert_eq!(tick.price, 71200.0);
        assert_eq!(tick.volume, 15);
        assert_eq!(tick.timestamp.to_rfc3339(), "2024-03-04T09:01:30+00:00");
    }

    #[test]
    fn rejects_bad_frames() {
        for frame in [
            "{}",
            "[1,2,3]",
            r#"{"symbol":"","price":1.0,"timestamp":"2024-03-04T09:01:30Z"}"#,
            r#"{"symbol":"005930","price":0.0,"timestamp":"2024-03-04T09:01:30Z"}"#,
            r#"{"symbol":"005930","price":10.0,"timestamp":"yesterday"}"#,
        ] {
            let err = parse_tick_frame(frame).unwrap_err();
            assert!(matches!(err, PipelineError::Malformed(_)), "{frame}");
        }
    }

    #[tokio::test]
    async fn watched_tick_is_stored_and_republished() {
        let hub = Arc::new(BroadcastHub::new());
        let mut sub = hub.subscribe(&[keys::tick_topic("005930")]).await.unwrap();
        let (ingest, store) = ingest(hub.clone());

        let tick = ingest
            .ingest_frame(r#"{"symbol":"005930","price":71200.0,"volume":15,"timestamp":"2024-03-04T09:01:30Z"}"#)
            .await
            .unwrap()
            .expect("watched symbol");

        assert_eq!(store.count("005930"), 1);
        assert_eq!(store.latest_price("005930").await.unwrap(), Some(71200.0));

        let msg = sub
            .recv_timeout(Duration::from_millis(100))
            .await
            .unwrap()
            .expect("republished tick");
        let record: TickRecord = serde_json::from_str(&msg.payload).unwrap();
        assert_eq!(record.parse("005930").unwrap(), tick);
        assert_eq!(ingest.accepted(), 1);
    }

    #[tokio::test]
    async fn frame_symbols_are_normalized_before_lookup() {
        let hub = Arc::new(BroadcastHub::new());
        let store = Arc::new(MemoryTickStore::new(100));
        let ingest = TickIngest::new(store.clone(), hub, &["BTCUSDT".to_string()]);

        let tick = ingest
            .ingest_frame(r#"{"symbol":" btcusdt ","price":67000.5,"volume":2,"timestamp":"2024-03-04T09:01:30Z"}"#)
            .await
            .unwrap()
            .expect("lowercase ticker of a watched symbol");

        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(store.count("BTCUSDT"), 1);
        assert_eq!(ingest.accepted(), 1);
        assert_eq!(ingest.ignored(), 0);
    }

    #[tokio::test]
    async fn unwatched_symbols_are_ignored() {
        let hub = Arc::new(BroadcastHub::new());
        let (ingest, store) = ingest(hub);

        let out = ingest
            .ingest_frame(r#"{"symbol":"035720","price":50000.0,"volume":1,"timestamp":"2024-03-04T09:01:30Z"}"#)
            .await
            .unwrap();
        assert!(out.is_none());
        assert_eq!(store.count("035720"), 0);
        assert_eq!(ingest.ignored(), 1);
        assert_eq!(ingest.accepted(), 0);
    }
}
