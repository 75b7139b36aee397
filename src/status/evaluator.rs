// =============================================================================
// Status Evaluator — multi-signal vote over 1m and 5m analyses
// =============================================================================
//
// Buy votes:   RSI(1m) < 30, RSI(5m) < 30, MACD histogram > 0 on BOTH 1m and
//              5m, price below the 1m lower Bollinger band.
// Sell votes:  RSI(1m) > 70, RSI(5m) > 70, MACD histogram < 0 on BOTH,
//              price above the 1m upper band.
//
// Decision:
//   buy > sell and buy >= 2    => BUY,  confidence = min(100, 25 * buy)
//   sell > buy and sell >= 2   => SELL, confidence = min(100, 25 * sell)
//   otherwise                  => NEUTRAL, confidence 50, the default message
//                                 followed by any weak votes
//
// Undefined indicators never vote. A missing 5m analysis only removes the
// 5m-based votes.

use chrono::{DateTime, Utc};

use crate::analysis::AnalysisResult;
use crate::error::PipelineError;
use crate::status::{MarketStatus, StatusKind};

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const MIN_VOTES: usize = 2;
const CONFIDENCE_PER_VOTE: usize = 25;
const NEUTRAL_CONFIDENCE: u8 = 50;

pub const NO_CLEAR_SIGNAL: &str = "No clear trading signal";

/// Derive the market status for `one_min`'s symbol.
pub fn evaluate(
    one_min: &AnalysisResult,
    five_min: Option<&AnalysisResult>,
    as_of: DateTime<Utc>,
) -> Result<MarketStatus, PipelineError> {
    let price = one_min.current_price;
    if !price.is_finite() || price <= 0.0 {
        return Err(PipelineError::Evaluation(format!(
            "invalid current price {price} for {}",
            one_min.symbol
        )));
    }

    let rsi_1m = one_min.indicators.rsi;
    let rsi_5m = five_min.and_then(|r| r.indicators.rsi);
    let hist_1m = one_min.indicators.macd_histogram;
    let hist_5m = five_min.and_then(|r| r.indicators.macd_histogram);
    let bb_upper = one_min.indicators.bb_upper;
    let bb_lower = one_min.indicators.bb_lower;

    let mut buy = Vec::new();
    let mut sell = Vec::new();

    // --- RSI ----------------------------------------------------------------
    for (label, rsi) in [("1m", rsi_1m), ("5m", rsi_5m)] {
        match rsi {
            Some(v) if v < RSI_OVERSOLD => buy.push(format!("RSI({label}) oversold at {v:.2}")),
            Some(v) if v > RSI_OVERBOUGHT => {
                sell.push(format!("RSI({label}) overbought at {v:.2}"))
            }
            _ => {}
        }
    }

    // --- MACD histogram, both timeframes must agree ----------------------------
    if let (Some(h1), Some(h5)) = (hist_1m, hist_5m) {
        if h1 > 0.0 && h5 > 0.0 {
            buy.push(format!("MACD histogram positive on 1m ({h1:.4}) and 5m ({h5:.4})"));
        } else if h1 < 0.0 && h5 < 0.0 {
            sell.push(format!("MACD histogram negative on 1m ({h1:.4}) and 5m ({h5:.4})"));
        }
    }

    // --- Bollinger envelope ----------------------------------------------------
    if let Some(lower) = bb_lower {
        if price < lower {
            buy.push(format!("Price {price:.2} below lower Bollinger band {lower:.2}"));
        }
    }
    if let Some(upper) = bb_upper {
        if price > upper {
            sell.push(format!("Price {price:.2} above upper Bollinger band {upper:.2}"));
        }
    }

    let (status, confidence, signals) = if buy.len() > sell.len() && buy.len() >= MIN_VOTES {
        (StatusKind::Buy, vote_confidence(buy.len()), buy)
    } else if sell.len() > buy.len() && sell.len() >= MIN_VOTES {
        (StatusKind::Sell, vote_confidence(sell.len()), sell)
    } else {
        let mut signals = vec![NO_CLEAR_SIGNAL.to_string()];
        signals.extend(buy);
        signals.extend(sell);
        (StatusKind::Neutral, NEUTRAL_CONFIDENCE, signals)
    };

    Ok(MarketStatus {
        symbol: one_min.symbol.clone(),
        status,
        confidence,
        signals,
        current_price: price,
        as_of,
    })
}

fn vote_confidence(votes: usize) -> u8 {
    // Bounded by 100, so the narrowing cannot truncate.
    (votes * CONFIDENCE_PER_VOTE).min(100) as u8
}
