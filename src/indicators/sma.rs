// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Arithmetic mean of the trailing `period` closes. The series is aligned 1:1
// with the input; the first `period - 1` entries are undefined (`None`).
//
// Each window is summed afresh, so rounding never accumulates across the
// series, and a window of identical closes averages to exactly that close.
// =============================================================================

/// Compute the SMA series for `prices` (oldest first).
///
/// # Edge cases
/// - `period == 0` => every entry `None`
/// - `prices.len() < period` => every entry `None`
pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return result;
    }

    for i in (period - 1)..prices.len() {
        result[i] = Some(window_mean(&prices[i + 1 - period..=i]));
    }

    result
}

/// Mean of a non-empty window. Shared with the EMA seed and the Bollinger
/// middle band so all three agree bit-for-bit.
pub(crate) fn window_mean(window: &[f64]) -> f64 {
    let first = window[0];
    if window.iter().all(|&p| p == first) {
        return first;
    }

    let mut sum = 0.0;
    for &p in window {
        sum += p;
    }
    sum / window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_warm_up_is_undefined() {
        let sma = calculate_sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(sma[0], None);
        assert_eq!(sma[1], None);
        assert!((sma[2].unwrap() - 2.0).abs() < 1e-12);
        assert!((sma[3].unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn sma_flat_window_is_exact() {
        let prices = [0.1; 30];
        let sma = calculate_sma(&prices, 20);
        assert!(sma[19..].iter().all(|v| *v == Some(0.1)));
    }

    #[test]
    fn sma_does_not_drift_after_large_prices() {
        let mut prices = vec![1.0e12, 3.3, 7.1];
        prices.extend([0.7; 10]);
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma[prices.len() - 1], Some(0.7));
    }

    #[test]
    fn sma_insufficient_data() {
        assert!(calculate_sma(&[1.0, 2.0], 5).iter().all(Option::is_none));
    }

    #[test]
    fn sma_period_zero() {
        let sma = calculate_sma(&[1.0, 2.0, 3.0], 0);
        assert_eq!(sma.len(), 3);
        assert!(sma.iter().all(Option::is_none));
    }

    #[test]
    fn sma_empty_input() {
        assert!(calculate_sma(&[], 3).is_empty());
    }

    #[test]
    fn sma_period_one_is_identity() {
        let prices = [5.0, 7.5, 6.25];
        let sma = calculate_sma(&prices, 1);
        for (p, s) in prices.iter().zip(sma) {
            assert!((p - s.unwrap()).abs() < 1e-12);
        }
    }
}
