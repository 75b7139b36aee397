// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators used by the
// analysis service. Every series is aligned 1:1 with the input closes
// (oldest first) and uses `Option<f64>` for "undefined": insufficient warm-up
// data propagates as `None`, never as zero.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

use serde::{Deserialize, Serialize};

use self::bollinger::calculate_bollinger;
use self::macd::calculate_macd;
use self::rsi::calculate_rsi;

/// Indicator look-back parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_bb_period")]
    pub bb_period: usize,
    #[serde(default = "default_bb_std_mult")]
    pub bb_std_mult: f64,
}

fn default_rsi_period() -> usize {
    14
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_bb_period() -> usize {
    20
}

fn default_bb_std_mult() -> f64 {
    2.0
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: default_rsi_period(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            bb_period: default_bb_period(),
            bb_std_mult: default_bb_std_mult(),
        }
    }
}

/// Indicator values for a single candle. `None` means "not enough data".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
}

/// Parallel indicator arrays aligned with a candle sequence (oldest first).
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub rsi: Vec<Option<f64>>,
    pub macd: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub macd_histogram: Vec<Option<f64>>,
    pub bb_upper: Vec<Option<f64>>,
    pub bb_middle: Vec<Option<f64>>,
    pub bb_lower: Vec<Option<f64>>,
}

impl IndicatorSeries {
    /// Run every indicator over `closes`.
    pub fn compute(closes: &[f64], params: &IndicatorParams) -> Self {
        let macd = calculate_macd(closes, params.macd_fast, params.macd_slow, params.macd_signal);
        let bands = calculate_bollinger(closes, params.bb_period, params.bb_std_mult);

        Self {
            rsi: calculate_rsi(closes, params.rsi_period),
            macd: macd.macd,
            macd_signal: macd.signal,
            macd_histogram: macd.histogram,
            bb_upper: bands.upper,
            bb_middle: bands.middle,
            bb_lower: bands.lower,
        }
    }

    pub fn len(&self) -> usize {
        self.rsi.len()
    }

    /// Values at index `i`; out of range reads as all-undefined.
    pub fn point(&self, i: usize) -> IndicatorPoint {
        fn at(series: &[Option<f64>], i: usize) -> Option<f64> {
            series.get(i).copied().flatten()
        }

        IndicatorPoint {
            rsi: at(&self.rsi, i),
            macd: at(&self.macd, i),
            macd_signal: at(&self.macd_signal, i),
            macd_histogram: at(&self.macd_histogram, i),
            bb_upper: at(&self.bb_upper, i),
            bb_middle: at(&self.bb_middle, i),
            bb_lower: at(&self.bb_lower, i),
        }
    }

    /// Values for the newest entry.
    pub fn latest(&self) -> IndicatorPoint {
        match self.len().checked_sub(1) {
            Some(last) => self.point(last),
            None => IndicatorPoint::default(),
        }
    }
}
