// =============================================================================
// Analysis records
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorPoint;
use crate::market_data::{Candle, Interval};

/// A candle with the indicator values computed at its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedCandle {
    #[serde(flatten)]
    pub candle: Candle,
    #[serde(flatten)]
    pub indicators: IndicatorPoint,
}

/// One analysis snapshot for `(symbol, interval)`. Never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub interval: Interval,
    pub as_of: DateTime<Utc>,
    pub current_price: f64,
    pub pct_change: f64,
    /// Indicator values of the newest candle.
    pub indicators: IndicatorPoint,
    /// Most recent candles, newest first.
    pub candles: Vec<AnalyzedCandle>,
}

/// Per-symbol entry of the market summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSummary {
    pub current_price: f64,
    pub pct_change: f64,
    pub rsi: Option<f64>,
    pub macd_histogram: Option<f64>,
    /// Position of the price inside the 1m Bollinger envelope, 0–100.
    pub bb_position: f64,
    pub as_of: DateTime<Utc>,
}

/// Percentage change from `previous_close` to `current_price`; zero when the
/// previous close is not positive.
pub fn percent_change(current_price: f64, previous_close: f64) -> f64 {
    if previous_close <= 0.0 {
        return 0.0;
    }
    (current_price - previous_close) / previous_close * 100.0
}
