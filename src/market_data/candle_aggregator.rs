// =============================================================================
// Candle Aggregator — raw ticks -> fixed-width OHLCV candles
// =============================================================================
//
// Ticks arrive roughly but not strictly in time order, so every batch is
// re-sorted before bucketing. A tick's bucket is its timestamp truncated down
// to a multiple of the interval width counted from the Unix epoch, which puts
// 5m candles on minutes 0, 5, 10, ... and 1h candles on the top of the hour.
//
// Candles are derived data: each call rebuilds them from the tick window it
// is handed and nothing is retained between calls.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::market_data::Interval;
use crate::store::TickStore;
use crate::types::{Tick, TickRecord};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One OHLCV candle. Invariant: `low <= open, close <= high`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub interval_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Candle {
    fn open_with(interval_start: DateTime<Utc>, tick: &Tick) -> Self {
        Self {
            interval_start,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.volume,
        }
    }

    fn absorb(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.volume = self.volume.saturating_add(tick.volume);
    }
}

/// Start of the bucket containing `ts` for `interval`.
pub fn bucket_start(ts: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    let width = interval.seconds();
    let start = ts.timestamp().div_euclid(width) * width;
    DateTime::from_timestamp(start, 0).unwrap_or(ts)
}

// ---------------------------------------------------------------------------
// Pure aggregation
// ---------------------------------------------------------------------------

/// Aggregate an unsorted batch of tick records for `symbol` into candles.
///
/// Returns at most `limit` candles, newest first. Records whose timestamp
/// (or price) cannot be parsed are dropped with a warning.
pub fn aggregate(symbol: &str, records: &[TickRecord], interval: Interval, limit: usize) -> Vec<Candle> {
    let mut ticks: Vec<Tick> = Vec::with_capacity(records.len());
    for record in records {
        match record.parse(symbol) {
            Ok(tick) => ticks.push(tick),
            Err(e) => warn!(symbol, error = %e, "dropping unparseable tick"),
        }
    }

    // Stable sort keeps arrival order for ticks sharing a timestamp.
    ticks.sort_by_key(|t| t.timestamp);

    let mut buckets: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();
    for tick in &ticks {
        let start = bucket_start(tick.timestamp, interval);
        buckets
            .entry(start)
            .and_modify(|candle| candle.absorb(tick))
            .or_insert_with(|| Candle::open_with(start, tick));
    }

    debug!(
        symbol,
        interval = %interval,
        ticks = ticks.len(),
        candles = buckets.len(),
        "ticks aggregated"
    );

    buckets.into_values().rev().take(limit).collect()
}

// ---------------------------------------------------------------------------
// Store-backed aggregator
// ---------------------------------------------------------------------------

/// Builds candles from the tick store for a trailing window.
pub struct CandleAggregator {
    store: Arc<dyn TickStore>,
}

impl CandleAggregator {
    pub fn new(store: Arc<dyn TickStore>) -> Self {
        Self { store }
    }

    /// Fetch ticks for the `limit` intervals ending at `end` and aggregate
    /// them. Newest candle first.
    pub async fn candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, PipelineError> {
        let window_secs = interval.seconds().saturating_mul(limit as i64);
        let start = end - chrono::Duration::seconds(window_secs);

        let records = self
            .store
            .ticks_between(symbol, start.timestamp_millis(), end.timestamp_millis())
            .await?;

        Ok(aggregate(symbol, &records, interval, limit))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
