// =============================================================================
// Analyzer Configuration — file-backed settings with env overrides
// =============================================================================
//
// Every tunable of the analysis service lives here. All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file, and a missing file simply means "run with defaults".
//
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::IndicatorParams;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "005930".to_string(),
        "000660".to_string(),
        "035720".to_string(),
    ]
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_analysis_cache_ttl_secs() -> u64 {
    10
}

fn default_analysis_result_ttl_secs() -> u64 {
    60
}

fn default_status_ttl_secs() -> u64 {
    120
}

fn default_summary_ttl_secs() -> u64 {
    120
}

fn default_cycle_period_secs() -> u64 {
    60
}

fn default_candle_window() -> usize {
    100
}

fn default_result_candle_count() -> usize {
    30
}

fn default_feed_recv_timeout_ms() -> u64 {
    1_000
}

fn default_resubscribe_backoff_secs() -> u64 {
    5
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_tick_retention() -> usize {
    50_000
}

// =============================================================================
// AnalyzerConfig
// =============================================================================

/// Top-level configuration for the analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    // --- Symbols & surfaces --------------------------------------------------

    /// Instrument codes the orchestrator analyses and subscribes to.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Address the read API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Optional WebSocket endpoint emitting JSON ticks. No ingest when unset.
    #[serde(default)]
    pub feed_url: Option<String>,

    // --- Freshness -----------------------------------------------------------

    #[serde(default = "default_analysis_cache_ttl_secs")]
    pub analysis_cache_ttl_secs: u64,

    #[serde(default = "default_analysis_result_ttl_secs")]
    pub analysis_result_ttl_secs: u64,

    #[serde(default = "default_status_ttl_secs")]
    pub status_ttl_secs: u64,

    #[serde(default = "default_summary_ttl_secs")]
    pub summary_ttl_secs: u64,

    // --- Loop timing ---------------------------------------------------------

    /// Target wall-clock length of one periodic cycle.
    #[serde(default = "default_cycle_period_secs")]
    pub cycle_period_secs: u64,

    /// How long the tick loop blocks on the feed before re-checking shutdown.
    #[serde(default = "default_feed_recv_timeout_ms")]
    pub feed_recv_timeout_ms: u64,

    #[serde(default = "default_resubscribe_backoff_secs")]
    pub resubscribe_backoff_secs: u64,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    // --- Analysis shape ------------------------------------------------------

    /// Candles requested per analysis.
    #[serde(default = "default_candle_window")]
    pub candle_window: usize,

    /// Newest candles included in a published result.
    #[serde(default = "default_result_candle_count")]
    pub result_candle_count: usize,

    /// Ticks kept per symbol by the in-memory tick store.
    #[serde(default = "default_tick_retention")]
    pub tick_retention: usize,

    #[serde(default)]
    pub indicators: IndicatorParams,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            bind_addr: default_bind_addr(),
            feed_url: None,
            analysis_cache_ttl_secs: default_analysis_cache_ttl_secs(),
            analysis_result_ttl_secs: default_analysis_result_ttl_secs(),
            status_ttl_secs: default_status_ttl_secs(),
            summary_ttl_secs: default_summary_ttl_secs(),
            cycle_period_secs: default_cycle_period_secs(),
            feed_recv_timeout_ms: default_feed_recv_timeout_ms(),
            resubscribe_backoff_secs: default_resubscribe_backoff_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            candle_window: default_candle_window(),
            result_candle_count: default_result_candle_count(),
            tick_retention: default_tick_retention(),
            indicators: IndicatorParams::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read analyzer config from {}", path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse analyzer config from {}", path.display()))?;
        config.symbols = config
            .symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|s| !s.is_empty())
            .collect();

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            "analyzer config loaded"
        );

        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(syms) = lookup("PULSE_SYMBOLS") {
            self.symbols = parse_symbols(&syms);
        }
        if let Some(addr) = lookup("PULSE_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(url) = lookup("PULSE_FEED_URL") {
            self.feed_url = Some(url).filter(|u| !u.trim().is_empty());
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let ind = &self.indicators;
        if self.symbols.is_empty() {
            bail!("no symbols configured");
        }
        if ind.rsi_period == 0 || ind.macd_fast == 0 || ind.macd_signal == 0 || ind.bb_period < 2 {
            bail!("indicator periods must be positive (bollinger period >= 2): {ind:?}");
        }
        if ind.macd_fast >= ind.macd_slow {
            bail!(
                "macd_fast ({}) must be shorter than macd_slow ({})",
                ind.macd_fast,
                ind.macd_slow
            );
        }
        if self.cycle_period_secs == 0 {
            bail!("cycle_period_secs must be positive");
        }
        if self.candle_window == 0 || self.result_candle_count == 0 {
            bail!("candle_window and result_candle_count must be positive");
        }
        Ok(())
    }
}

/// Canonical form of a symbol wherever it enters the process: config, env,
/// feed frames and request paths.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Split a comma-separated symbol list, normalizing entries and dropping
/// empty ones.
pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(normalize_symbol)
        .filter(|s| !s.is_empty())
        .collect()
}
