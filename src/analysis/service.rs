// =============================================================================
// Market Data Service — ticks -> candles -> indicators -> AnalysisResult
// =============================================================================
//
// analyze(symbol, interval):
//   1. Serve from the in-process cache when the entry is younger than the
//      cache TTL (10s by default).
//   2. Aggregate the trailing `candle_window` intervals of ticks. No candles
//      means "no data yet" and yields `Ok(None)`.
//   3. Run the indicator engine over the closes (oldest first) and attach
//      each candle's values.
//   4. Quote the latest price independently of the last close and compute
//      the change against the previous candle's close.
//   5. Cache the snapshot and write it to the result sink with a fixed TTL.
//
// summarize(symbols) fans `analyze(symbol, 1m)` out concurrently; one
// symbol's failure only removes that symbol from the map.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::analysis::cache::TtlCache;
use crate::analysis::result::{percent_change, AnalysisResult, AnalyzedCandle, SymbolSummary};
use crate::clock::Clock;
use crate::error::PipelineError;
use crate::indicators::bollinger::band_position;
use crate::indicators::{IndicatorParams, IndicatorSeries};
use crate::market_data::{CandleAggregator, Interval};
use crate::runtime_config::AnalyzerConfig;
use crate::store::{keys, put_json, ResultSink, TickStore};

/// Tunables for [`MarketDataService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub cache_ttl: chrono::Duration,
    pub result_ttl: std::time::Duration,
    /// Number of candles requested per analysis.
    pub candle_window: usize,
    /// Number of newest candles kept in the published result.
    pub result_candles: usize,
    pub indicators: IndicatorParams,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from(&AnalyzerConfig::default())
    }
}

impl From<&AnalyzerConfig> for ServiceSettings {
    fn from(cfg: &AnalyzerConfig) -> Self {
        Self {
            cache_ttl: chrono::Duration::seconds(cfg.analysis_cache_ttl_secs as i64),
            result_ttl: std::time::Duration::from_secs(cfg.analysis_result_ttl_secs),
            candle_window: cfg.candle_window,
            result_candles: cfg.result_candle_count,
            indicators: cfg.indicators.clone(),
        }
    }
}

pub struct MarketDataService {
    aggregator: CandleAggregator,
    ticks: Arc<dyn TickStore>,
    sink: Arc<dyn ResultSink>,
    clock: Arc<dyn Clock>,
    cache: TtlCache<(String, Interval), AnalysisResult>,
    settings: ServiceSettings,
}

impl MarketDataService {
    pub fn new(
        ticks: Arc<dyn TickStore>,
        sink: Arc<dyn ResultSink>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            aggregator: CandleAggregator::new(ticks.clone()),
            ticks,
            sink,
            clock,
            cache: TtlCache::new(settings.cache_ttl),
            settings,
        }
    }

    /// Analyse `symbol` at `interval`. `Ok(None)` means no candles exist yet.
    pub async fn analyze(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<AnalysisResult>, PipelineError> {
        let now = self.clock.now();
        let cache_key = (symbol.to_string(), interval);

        if let Some(hit) = self.cache.get_fresh(&cache_key, now) {
            debug!(symbol, interval = %interval, "analysis served from cache");
            return Ok(Some(hit));
        }

        let mut candles = self
            .aggregator
            .candles(symbol, interval, self.settings.candle_window, now)
            .await?;
        if candles.is_empty() {
            debug!(symbol, interval = %interval, "no candles yet");
            return Ok(None);
        }

        // Aggregator output is newest first; indicators want oldest first.
        candles.reverse();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let series = IndicatorSeries::compute(&closes, &self.settings.indicators);

        let last_close = closes[closes.len() - 1];
        let previous_close = if closes.len() >= 2 {
            closes[closes.len() - 2]
        } else {
            last_close
        };

        let current_price = match self.ticks.latest_price(symbol).await? {
            Some(price) if price.is_finite() => price,
            _ => last_close,
        };

        let recent: Vec<AnalyzedCandle> = candles
            .into_iter()
            .enumerate()
            .rev()
            .take(self.settings.result_candles)
            .map(|(i, candle)| AnalyzedCandle {
                candle,
                indicators: series.point(i),
            })
            .collect();

        let result = AnalysisResult {
            symbol: symbol.to_string(),
            interval,
            as_of: now,
            current_price,
            pct_change: percent_change(current_price, previous_close),
            indicators: series.latest(),
            candles: recent,
        };

        put_json(
            self.sink.as_ref(),
            &keys::analysis_key(symbol, interval),
            &result,
            self.settings.result_ttl,
        )
        .await?;
        self.cache.insert(cache_key, result.clone(), now);

        debug!(
            symbol,
            interval = %interval,
            price = current_price,
            rsi = ?result.indicators.rsi,
            "analysis computed"
        );

        Ok(Some(result))
    }

    /// Concurrent 1m analysis for every symbol, reduced to summary entries.
    /// Symbols with no data or a failed analysis are omitted.
    pub async fn summarize(&self, symbols: &[String]) -> BTreeMap<String, SymbolSummary> {
        let outcomes = join_all(
            symbols
                .iter()
                .map(|symbol| async move { (symbol, self.analyze(symbol, Interval::Minute1).await) }),
        )
        .await;

        let mut summary = BTreeMap::new();
        for (symbol, outcome) in outcomes {
            match outcome {
                Ok(Some(result)) => {
                    summary.insert(symbol.clone(), summarize_result(&result));
                }
                Ok(None) => debug!(symbol = %symbol, "summary skipped: no data yet"),
                Err(e) => warn!(symbol = %symbol, error = %e, "summary skipped: analysis failed"),
            }
        }

        info!(requested = symbols.len(), summarized = summary.len(), "market summary built");
        summary
    }
}

fn summarize_result(result: &AnalysisResult) -> SymbolSummary {
    SymbolSummary {
        current_price: result.current_price,
        pct_change: result.pct_change,
        rsi: result.indicators.rsi,
        macd_histogram: result.indicators.macd_histogram,
        bb_position: band_position(
            result.current_price,
            result.indicators.bb_upper,
            result.indicators.bb_lower,
        ),
        as_of: result.as_of,
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{get_json, MemorySink};
    use crate::types::TickRecord;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
    }

    /// Fixed tick history plus an explicit quote; `failing` symbols error.
    struct StubStore {
        records: Vec<TickRecord>,
        latest: Option<f64>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl TickStore for StubStore {
        async fn ticks_between(
            &self,
            symbol: &str,
            start_ms: i64,
            end_ms: i64,
        ) -> Result<Vec<TickRecord>, PipelineError> {
            if self.failing.iter().any(|s| s == symbol) {
                return Err(PipelineError::unavailable("tick store", "connection reset"));
            }
            Ok(self
                .records
                .iter()
                .filter(|r| {
                    let ts = crate::types::parse_timestamp(&r.timestamp)
                        .map(|t| t.timestamp_millis())
                        .unwrap_or(start_ms);
                    (start_ms..=end_ms).contains(&ts)
                })
                .cloned()
                .collect())
        }

        async fn latest_price(&self, _symbol: &str) -> Result<Option<f64>, PipelineError> {
            Ok(self.latest)
        }
    }

    /// One tick per minute for the `minutes` minutes before `now()`.
    fn minute_ticks(minutes: i64) -> Vec<TickRecord> {
        (0..minutes)
            .map(|i| TickRecord {
                price: 100.0 + (i as f64 * 0.45).sin() * 3.0,
                volume: 10,
                timestamp: (now() - chrono::Duration::minutes(minutes - i)
                    + chrono::Duration::seconds(5))
                .to_rfc3339(),
            })
            .collect()
    }

    fn service(store: StubStore) -> (MarketDataService, Arc<ManualClock>, Arc<MemorySink>) {
        let clock = Arc::new(ManualClock::new(now()));
        let sink = Arc::new(MemorySink::new(clock.clone()));
        let svc = MarketDataService::new(
            Arc::new(store),
            sink.clone(),
            clock.clone(),
            ServiceSettings::default(),
        );
        (svc, clock, sink)
    }

    #[tokio::test]
    async fn no_ticks_means_no_result() {
        let (svc, _, _) = service(StubStore {
            records: vec![],
            latest: None,
            failing: vec![],
        });
        assert!(svc.analyze("005930", Interval::Minute1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn analysis_has_latest_indicators_and_newest_first_candles() {
        let (svc, _, _) = service(StubStore {
            records: minute_ticks(60),
            latest: None,
            failing: vec![],
        });
        let result = svc.analyze("005930", Interval::Minute1).await.unwrap().unwrap();

        assert_eq!(result.candles.len(), 30);
        assert!(result.candles[0].candle.interval_start > result.candles[1].candle.interval_start);
        assert!(result.indicators.rsi.is_some());
        assert!(result.indicators.macd_histogram.is_some());
        assert!(result.indicators.bb_lower.is_some());
        // Latest indicator values belong to the newest candle.
        assert_eq!(result.indicators, result.candles[0].indicators);
        // Without a separate quote the price is the last close.
        assert_eq!(result.current_price, result.candles[0].candle.close);
    }

    #[tokio::test]
    async fn pct_change_uses_quote_against_previous_close() {
        let (svc, _, _) = service(StubStore {
            records: minute_ticks(5),
            latest: Some(110.0),
            failing: vec![],
        });
        let result = svc.analyze("005930", Interval::Minute1).await.unwrap().unwrap();
        let previous_close = result.candles[1].candle.close;
        let expected = (110.0 - previous_close) / previous_close * 100.0;
        assert!((result.pct_change - expected).abs() < 1e-9);
        assert_eq!(result.current_price, 110.0);
        // Too little history for any indicator.
        assert!(result.indicators.rsi.is_none());
    }

    #[tokio::test]
    async fn cached_within_ttl_recomputed_after() {
        let (svc, clock, _) = service(StubStore {
            records: minute_ticks(60),
            latest: None,
            failing: vec![],
        });
        let first = svc.analyze("005930", Interval::Minute1).await.unwrap().unwrap();

        clock.advance(chrono::Duration::seconds(9));
        let second = svc.analyze("005930", Interval::Minute1).await.unwrap().unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );

        clock.advance(chrono::Duration::seconds(2));
        let third = svc.analyze("005930", Interval::Minute1).await.unwrap().unwrap();
        assert_ne!(third.as_of, first.as_of);
        assert_eq!(third.as_of, now() + chrono::Duration::seconds(11));
    }

    #[tokio::test]
    async fn result_is_written_to_sink_with_expiry() {
        let (svc, clock, sink) = service(StubStore {
            records: minute_ticks(60),
            latest: None,
            failing: vec![],
        });
        let result = svc.analyze("005930", Interval::Minute5).await.unwrap().unwrap();

        let key = keys::analysis_key("005930", Interval::Minute5);
        let stored = sink.get(&key).await.unwrap().unwrap();
        assert_eq!(stored, serde_json::to_string(&result).unwrap());
        let decoded: AnalysisResult = get_json(sink.as_ref(), &key).await.unwrap().unwrap();
        assert_eq!(decoded.candles.len(), result.candles.len());

        clock.advance(chrono::Duration::seconds(60));
        assert!(sink.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let (svc, _, _) = service(StubStore {
            records: minute_ticks(10),
            latest: None,
            failing: vec!["005930".into()],
        });
        let err = svc.analyze("005930", Interval::Minute1).await.unwrap_err();
        assert!(matches!(err, PipelineError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn summarize_isolates_failures() {
        let (svc, _, _) = service(StubStore {
            records: minute_ticks(60),
            latest: None,
            failing: vec!["000660".into()],
        });
        let symbols = vec!["005930".to_string(), "000660".to_string(), "035720".to_string()];
        let summary = svc.summarize(&symbols).await;

        assert!(summary.contains_key("005930"));
        assert!(summary.contains_key("035720"));
        assert!(!summary.contains_key("000660"));
        for entry in summary.values() {
            assert!((0.0..=100.0).contains(&entry.bb_position));
        }
    }

    #[test]
    fn summary_defaults_bb_position_without_bands() {
        let result = AnalysisResult {
            symbol: "005930".into(),
            interval: Interval::Minute1,
            as_of: now(),
            current_price: 100.0,
            pct_change: 0.0,
            indicators: Default::default(),
            candles: vec![],
        };
        assert_eq!(summarize_result(&result).bb_position, 50.0);
    }
}
