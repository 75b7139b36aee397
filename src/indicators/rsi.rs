// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Step 1: Compute price changes (deltas) from consecutive closes.
// Step 2: Seed average gain / average loss with the plain mean of the first
//         `period` gains / losses.
// Step 3: Apply Wilder's smoothing:
//           avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//           avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4: RS  = avg_gain / avg_loss   (zero loss replaced by ZERO_LOSS_EPSILON)
//          RSI = 100 - 100 / (1 + RS)
//
// Thresholds used by the status evaluator: RSI > 70 overbought, RSI < 30
// oversold.
// =============================================================================

/// Stand-in for a zero average loss so RS stays finite.
const ZERO_LOSS_EPSILON: f64 = 1e-10;

/// Compute the RSI series for `closes` (oldest first), aligned 1:1 with the
/// input.
///
/// The first RSI value lands at index `period` (the first `period` deltas
/// seed the averages); indices `0..period` are `None`.
///
/// # Edge cases
/// - `period == 0` => every entry `None`
/// - `closes.len() < period + 1` => every entry `None`
/// - Average loss of zero uses `ZERO_LOSS_EPSILON`, so a market with only
///   gains reads ~100 and a perfectly flat market reads 0.
/// - A non-finite result stops the series.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return result;
    }

    // --- Split deltas into gains and losses ----------------------------------
    let (gains, losses): (Vec<f64>, Vec<f64>) = closes
        .windows(2)
        .map(|w| {
            let delta = w[1] - w[0];
            (delta.max(0.0), (-delta).max(0.0))
        })
        .unzip();

    // --- Seed with the mean of the first `period` deltas ---------------------
    let period_f = period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 0..period {
        avg_gain += gains[i];
        avg_loss += losses[i];
    }
    avg_gain /= period_f;
    avg_loss /= period_f;

    match rsi_from_averages(avg_gain, avg_loss) {
        Some(rsi) => result[period] = Some(rsi),
        None => return result,
    }

    // --- Wilder's smoothing for subsequent values ----------------------------
    // Delta i sits between close i and close i + 1.
    for i in period..gains.len() {
        avg_gain = (avg_gain * (period_f - 1.0) + gains[i]) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + losses[i]) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => result[i + 1] = Some(rsi),
            None => break,
        }
    }

    result
}

/// Convert average gain / average loss into an RSI value.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let loss = if avg_loss == 0.0 {
        ZERO_LOSS_EPSILON
    } else {
        avg_loss
    };
    let rs = avg_gain / loss;
    let rsi = 100.0 - 100.0 / (1.0 + rs);

    rsi.is_finite().then_some(rsi)
}
