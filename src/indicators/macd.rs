// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   macd_line = EMA(fast) - EMA(slow)          wherever both are defined
//   signal    = EMA(signal) over the *defined* part of macd_line, left-padded
//               with `None` back into the original index space
//   histogram = macd_line - signal             wherever both are defined
//
// All three series are aligned 1:1 with the input closes. With fewer than
// `slow + signal` closes every output is undefined.
// =============================================================================

use super::ema::calculate_ema;

/// The three aligned MACD output series.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

impl MacdSeries {
    fn undefined(len: usize) -> Self {
        Self {
            macd: vec![None; len],
            signal: vec![None; len],
            histogram: vec![None; len],
        }
    }
}

/// Compute MACD for `closes` (oldest first).
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let len = closes.len();
    if fast == 0 || slow == 0 || signal == 0 || len < slow + signal {
        return MacdSeries::undefined(len);
    }

    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);

    let macd: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    // Signal line runs over the defined sub-sequence only.
    let (defined_idx, defined_vals): (Vec<usize>, Vec<f64>) = macd
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .unzip();

    let mut signal_line = vec![None; len];
    for (k, value) in calculate_ema(&defined_vals, signal).into_iter().enumerate() {
        signal_line[defined_idx[k]] = value;
    }

    let histogram = macd
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    MacdSeries {
        macd,
        signal: signal_line,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn macd_insufficient_data_is_fully_undefined() {
        let series = calculate_macd(&wave(34), 12, 26, 9);
        assert_eq!(series.macd.len(), 34);
        assert!(series.macd.iter().all(Option::is_none));
        assert!(series.signal.iter().all(Option::is_none));
        assert!(series.histogram.iter().all(Option::is_none));
    }

    #[test]
    fn macd_warm_up_alignment() {
        let series = calculate_macd(&wave(60), 12, 26, 9);
        // macd defined from slow - 1, signal from slow - 1 + signal - 1.
        assert!(series.macd[..25].iter().all(Option::is_none));
        assert!(series.macd[25..].iter().all(Option::is_some));
        assert!(series.signal[..33].iter().all(Option::is_none));
        assert!(series.signal[33..].iter().all(Option::is_some));
        assert_eq!(series.histogram[32], None);
        assert!(series.histogram[33].is_some());
    }

    #[test]
    fn macd_histogram_identity_is_exact() {
        let series = calculate_macd(&wave(120), 12, 26, 9);
        for i in 0..120 {
            if let (Some(m), Some(s), Some(h)) =
                (series.macd[i], series.signal[i], series.histogram[i])
            {
                assert_eq!(h, m - s, "index {i}");
            }
        }
    }

    #[test]
    fn macd_signal_seed_is_mean_of_first_defined_values() {
        let closes = wave(50);
        let series = calculate_macd(&closes, 3, 6, 4);
        let first: Vec<f64> = series.macd.iter().flatten().take(4).copied().collect();
        let mean = first.iter().sum::<f64>() / 4.0;
        let seed = series.signal.iter().flatten().next().copied().unwrap();
        assert!((seed - mean).abs() < 1e-12);
    }

    #[test]
    fn macd_flat_prices_are_zero() {
        let series = calculate_macd(&[50.0; 40], 12, 26, 9);
        for v in series.histogram.iter().flatten() {
            assert!(v.abs() < 1e-12);
        }
    }
}
