// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value (index `period - 1`) is seeded with the SMA of the
// first `period` closes. Output is aligned 1:1 with the input.
// =============================================================================

use super::sma::window_mean;

/// Compute the EMA series for `prices` (oldest first) and look-back `period`.
///
/// # Edge cases
/// - `period == 0` => every entry `None`
/// - `prices.len() < period` => every entry `None`
/// - A non-finite intermediate value stops the series; later entries stay
///   `None` rather than carrying a broken value forward.
pub fn calculate_ema(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let seed = window_mean(&prices[..period]);
    if !seed.is_finite() {
        return result;
    }
    result[period - 1] = Some(seed);

    let mut prev_ema = seed;
    for (i, &price) in prices.iter().enumerate().skip(period) {
        let ema = price * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result[i] = Some(ema);
        prev_ema = ema;
    }

    result
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::sma::calculate_sma;

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).iter().all(Option::is_none));
    }

    #[test]
    fn ema_insufficient_data() {
        let ema = calculate_ema(&[1.0, 2.0], 5);
        assert_eq!(ema, vec![None, None]);
    }

    #[test]
    fn ema_period_equals_length() {
        let ema = calculate_ema(&[2.0, 4.0, 6.0], 3);
        assert_eq!(ema[..2], [None, None]);
        // Should be the SMA = (2+4+6)/3 = 4.0
        assert!((ema[2].unwrap() - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1..=10]: SMA seed of first 5 = 3.0, multiplier = 1/3
        let closes: Vec<f64> = (1..=10).map(f64::from).collect();
        let ema = calculate_ema(&closes, 5);
        assert_eq!(ema.len(), 10);
        assert!(ema[..4].iter().all(Option::is_none));

        let mult = 2.0 / 6.0;
        let mut expected = 3.0;
        assert!((ema[4].unwrap() - expected).abs() < 1e-10);
        for i in 5..10 {
            expected = closes[i] * mult + expected * (1.0 - mult);
            assert!((ema[i].unwrap() - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn ema_seed_matches_sma_exactly() {
        let closes = [
            101.3, 99.8, 100.4, 102.9, 103.1, 98.7, 97.2, 99.9, 101.0, 100.05, 104.4, 103.3,
        ];
        for period in 1..=closes.len() {
            let ema = calculate_ema(&closes, period);
            let sma = calculate_sma(&closes, period);
            assert_eq!(ema[period - 1], sma[period - 1], "period {period}");
        }
    }

    #[test]
    fn ema_handles_nan_in_input() {
        let ema = calculate_ema(&[1.0, 2.0, 3.0, f64::NAN, 5.0], 3);
        // Seed is 2.0, the NaN breaks the series.
        assert_eq!(ema[2], Some(2.0));
        assert_eq!(ema[3], None);
        assert_eq!(ema[4], None);
    }
}
