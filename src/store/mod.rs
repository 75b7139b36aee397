// =============================================================================
// Collaborator seams — tick store, result sink, publish/subscribe
// =============================================================================
//
// The analysis core never talks to a concrete database or broker. It reads
// ticks through `TickStore`, writes expiring JSON snapshots through
// `ResultSink`, and consumes/produces topic messages through `PubSub`.
// In-process implementations live in `memory`.

pub mod keys;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PipelineError;
use crate::types::TickRecord;

pub use memory::{BroadcastHub, MemorySink, MemoryTickStore};

/// Time-ordered historical tick storage (read-only from the core).
#[async_trait]
pub trait TickStore: Send + Sync {
    /// All tick records for `symbol` with a timestamp in
    /// `[start_ms, end_ms]` (Unix milliseconds).
    async fn ticks_between(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<TickRecord>, PipelineError>;

    /// Latest quoted price, which may be newer than the last candle close.
    async fn latest_price(&self, symbol: &str) -> Result<Option<f64>, PipelineError>;
}

/// Key-value store with per-key expiry.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), PipelineError>;

    /// `Ok(None)` for a missing or expired key.
    async fn get(&self, key: &str) -> Result<Option<String>, PipelineError>;

    /// Reachability check used at startup.
    async fn ping(&self) -> Result<(), PipelineError>;
}

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    pub topic: String,
    pub payload: String,
}

/// Topic-addressed publish/subscribe channel.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Returns the number of subscribers that received the message.
    async fn publish(&self, topic: &str, payload: String) -> Result<usize, PipelineError>;

    async fn subscribe(&self, topics: &[String]) -> Result<Box<dyn Subscription>, PipelineError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Wait up to `timeout` for the next message; `Ok(None)` on timeout.
    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<FeedMessage>, PipelineError>;
}

/// Serialize `value` and store it under `key` with `ttl`.
pub async fn put_json<T: Serialize + ?Sized>(
    sink: &dyn ResultSink,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), PipelineError> {
    let body = serde_json::to_string(value)?;
    sink.set_ex(key, body, ttl).await
}

/// Read and deserialize the value under `key`, if present.
pub async fn get_json<T: DeserializeOwned>(
    sink: &dyn ResultSink,
    key: &str,
) -> Result<Option<T>, PipelineError> {
    match sink.get(key).await? {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}
