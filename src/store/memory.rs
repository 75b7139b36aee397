// =============================================================================
// In-process collaborators: tick store, expiring sink, broadcast hub
// =============================================================================
//
// Thread safety follows the rest of the engine: parking_lot::RwLock around
// plain collections, never held across an `.await`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::PipelineError;
use crate::store::{FeedMessage, PubSub, ResultSink, Subscription, TickStore};
use crate::types::{Tick, TickRecord};

// ---------------------------------------------------------------------------
// MemoryTickStore
// ---------------------------------------------------------------------------

/// Bounded per-symbol tick history indexed by timestamp (Unix ms).
///
/// Each ring is kept sorted by timestamp, so eviction drops the oldest tick
/// even when the feed delivers out of order. The latest quote is still the
/// price of the most recently appended tick.
pub struct MemoryTickStore {
    ticks: RwLock<HashMap<String, VecDeque<(i64, TickRecord)>>>,
    latest: RwLock<HashMap<String, f64>>,
    max_per_symbol: usize,
}

impl MemoryTickStore {
    pub fn new(max_per_symbol: usize) -> Self {
        Self {
            ticks: RwLock::new(HashMap::new()),
            latest: RwLock::new(HashMap::new()),
            max_per_symbol,
        }
    }

    /// Record a tick and make its price the latest quote for the symbol.
    /// Entries with the oldest timestamps are evicted once `max_per_symbol`
    /// is exceeded; equal timestamps keep arrival order.
    pub fn append(&self, tick: &Tick) {
        let ts = tick.timestamp.timestamp_millis();
        {
            let mut map = self.ticks.write();
            let ring = map.entry(tick.symbol.clone()).or_default();
            let at = ring.partition_point(|(t, _)| *t <= ts);
            ring.insert(at, (ts, TickRecord::from(tick)));
            while ring.len() > self.max_per_symbol {
                ring.pop_front();
            }
        }
        self.latest.write().insert(tick.symbol.clone(), tick.price);
    }

    #[cfg(test)]
    pub fn count(&self, symbol: &str) -> usize {
        self.ticks.read().get(symbol).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl TickStore for MemoryTickStore {
    async fn ticks_between(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<TickRecord>, PipelineError> {
        let map = self.ticks.read();
        Ok(map
            .get(symbol)
            .map(|ring| {
                ring.iter()
                    .filter(|(ts, _)| (start_ms..=end_ms).contains(ts))
                    .map(|(_, rec)| rec.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_price(&self, symbol: &str) -> Result<Option<f64>, PipelineError> {
        Ok(self.latest.read().get(symbol).copied())
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

struct SinkEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Key-value map with `SET key value EXPIRE ttl` semantics against `clock`.
pub struct MemorySink {
    entries: RwLock<HashMap<String, SinkEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemorySink {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Drop every expired key; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), PipelineError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| PipelineError::Malformed(format!("ttl out of range: {e}")))?;
        let expires_at = self.clock.now() + ttl;
        self.entries
            .write()
            .insert(key.to_string(), SinkEntry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PipelineError> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(e) if e.expires_at > now => return Ok(Some(e.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: evict lazily.
        self.entries.write().remove(key);
        Ok(None)
    }

    async fn ping(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BroadcastHub
// ---------------------------------------------------------------------------

const HUB_CAPACITY: usize = 1024;

/// Publish/subscribe hub. Every subscriber sees every message and keeps the
/// ones on its own topics.
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<FeedMessage>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for BroadcastHub {
    async fn publish(&self, topic: &str, payload: String) -> Result<usize, PipelineError> {
        let msg = FeedMessage {
            topic: topic.to_string(),
            payload,
        };
        // No receivers is not an error: nobody is listening yet.
        Ok(self.tx.send(msg).unwrap_or(0))
    }

    async fn subscribe(&self, topics: &[String]) -> Result<Box<dyn Subscription>, PipelineError> {
        debug!(topics = ?topics, "hub subscription opened");
        Ok(Box::new(HubSubscription {
            rx: self.tx.subscribe(),
            topics: topics.iter().cloned().collect(),
        }))
    }
}

struct HubSubscription {
    rx: broadcast::Receiver<FeedMessage>,
    topics: HashSet<String>,
}

#[async_trait]
impl Subscription for HubSubscription {
    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<FeedMessage>, PipelineError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Err(_elapsed) => return Ok(None),
                Ok(Ok(msg)) => {
                    if self.topics.contains(&msg.topic) {
                        return Ok(Some(msg));
                    }
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "hub subscriber lagged — messages dropped");
                }
                Ok(Err(RecvError::Closed)) => return Err(PipelineError::FeedClosed),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
