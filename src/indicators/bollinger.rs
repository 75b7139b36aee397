// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ), where σ is the *sample* standard deviation
// (divide by period - 1) of the trailing window.
//
// A window of identical closes collapses all three bands onto that close
// exactly.
//
// Each band is aligned 1:1 with the input closes. The status evaluator uses
// the 1m lower/upper bands as oversold/overbought thresholds, and the market
// summary reports where the current price sits inside the envelope.

use super::sma::calculate_sma;

/// The three aligned band series.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Calculate Bollinger Bands for `closes` (oldest first).
///
/// Returns fully undefined bands when:
/// - Fewer than `period` data points.
/// - `period < 2` (the sample deviation is undefined for one point).
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> BollingerSeries {
    let len = closes.len();
    let mut upper = vec![None; len];
    let mut middle = vec![None; len];
    let mut lower = vec![None; len];

    if period < 2 || len < period {
        return BollingerSeries {
            upper,
            middle,
            lower,
        };
    }

    let sma = calculate_sma(closes, period);
    for i in (period - 1)..len {
        let Some(mean) = sma[i] else { continue };
        let std_dev = sample_std_dev(&closes[i + 1 - period..=i], mean);
        if !mean.is_finite() || !std_dev.is_finite() {
            continue;
        }

        upper[i] = Some(mean + num_std * std_dev);
        middle[i] = Some(mean);
        lower[i] = Some(mean - num_std * std_dev);
    }

    BollingerSeries {
        upper,
        middle,
        lower,
    }
}

/// Sample standard deviation of a window with at least two closes.
fn sample_std_dev(window: &[f64], mean: f64) -> f64 {
    if window.iter().all(|&x| x == window[0]) {
        return 0.0;
    }

    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
        / (window.len() - 1) as f64;
    variance.sqrt()
}

/// Where `price` sits inside the band envelope, as a percentage clamped to
/// [0, 100]. Degenerate or undefined bands read as the midpoint (50).
pub fn band_position(price: f64, upper: Option<f64>, lower: Option<f64>) -> f64 {
    match (upper, lower) {
        (Some(upper), Some(lower)) if upper - lower > 0.0 => {
            ((price - lower) / (upper - lower) * 100.0).clamp(0.0, 100.0)
        }
        _ => 50.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_known_values() {
        let closes = [10.0, 12.0, 11.0, 13.0, 15.0];
        let bb = calculate_bollinger(&closes, 5, 2.0);
        // mean 12.2, sample σ = 1.9235384061671346
        assert!((bb.middle[4].unwrap() - 12.2).abs() < 1e-9);
        assert!((bb.upper[4].unwrap() - 16.047076812334268).abs() < 1e-9);
        assert!((bb.lower[4].unwrap() - 8.35292318766573).abs() < 1e-9);
        assert!(bb.upper[..4].iter().all(Option::is_none));
    }

    #[test]
    fn bollinger_insufficient_data() {
        let bb = calculate_bollinger(&[1.0, 2.0, 3.0], 20, 2.0);
        assert!(bb.upper.iter().all(Option::is_none));
        assert!(bb.middle.iter().all(Option::is_none));
        assert!(bb.lower.iter().all(Option::is_none));
    }

    #[test]
    fn bollinger_constant_price_collapses_bands() {
        let bb = calculate_bollinger(&[100.0; 25], 20, 2.0);
        for i in 19..25 {
            assert_eq!(bb.upper[i], bb.middle[i]);
            assert_eq!(bb.lower[i], bb.middle[i]);
            assert_eq!(bb.middle[i], Some(100.0));
        }
    }

    #[test]
    fn bollinger_constant_decimal_price_collapses_bands_exactly() {
        for price in [0.1, 71_000.1, 3.3] {
            let bb = calculate_bollinger(&[price; 20], 20, 2.0);
            assert_eq!(bb.middle[19], Some(price), "price {price}");
            assert_eq!(bb.upper[19], bb.middle[19], "price {price}");
            assert_eq!(bb.lower[19], bb.middle[19], "price {price}");
        }
    }

    #[test]
    fn bollinger_flat_tail_after_movement_collapses_bands() {
        // The window slides off a volatile stretch onto a flat one.
        let mut closes = vec![101.7, 99.3, 100.9, 98.1, 102.6, 97.4, 100.2, 103.8];
        closes.extend([0.3; 20]);
        let bb = calculate_bollinger(&closes, 20, 2.0);
        let last = closes.len() - 1;
        assert_eq!(bb.middle[last], Some(0.3));
        assert_eq!(bb.upper[last], Some(0.3));
        assert_eq!(bb.lower[last], Some(0.3));
        assert!(bb.upper[last - 1] > bb.lower[last - 1]);
    }

    #[test]
    fn bollinger_middle_matches_sma() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (f64::from(i) * 0.7).cos() * 4.0).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0);
        let sma = calculate_sma(&closes, 20);
        assert_eq!(bb.middle[19..], sma[19..]);
    }

    #[test]
    fn bollinger_bands_bracket_middle() {
        let closes: Vec<f64> = (1..=40).map(|x| f64::from(x % 7) + 50.0).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0);
        for i in 19..40 {
            assert!(bb.upper[i] >= bb.middle[i]);
            assert!(bb.lower[i] <= bb.middle[i]);
        }
    }

    #[test]
    fn band_position_clamps_and_defaults() {
        assert_eq!(band_position(15.0, Some(20.0), Some(10.0)), 50.0);
        assert_eq!(band_position(25.0, Some(20.0), Some(10.0)), 100.0);
        assert_eq!(band_position(5.0, Some(20.0), Some(10.0)), 0.0);
        assert_eq!(band_position(15.0, Some(10.0), Some(10.0)), 50.0);
        assert_eq!(band_position(15.0, None, Some(10.0)), 50.0);
    }
}
