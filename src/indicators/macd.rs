// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   macd      = EMA_fast - EMA_slow
//   signal    = EMA_signal(macd)
//   histogram = macd - signal
//
// All three output series are aligned on the signal line: the first element
// corresponds to input index `slow - 1 + signal - 1`.
// =============================================================================

use super::ema::calculate_ema;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn calculate_macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    if fast == 0 || signal == 0 || fast >= slow {
        return MacdSeries::default();
    }

    let fast_ema = calculate_ema(values, fast);
    let slow_ema = calculate_ema(values, slow);
    if slow_ema.is_empty() {
        return MacdSeries::default();
    }

    // Align the fast series on the slow one.
    let offset = slow - fast;
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .zip(fast_ema.iter().skip(offset))
        .map(|(s, f)| f - s)
        .collect();

    let signal_line = calculate_ema(&macd_line, signal);
    let macd: Vec<f64> = macd_line[macd_line.len() - signal_line.len()..].to_vec();
    let histogram = macd.iter().zip(&signal_line).map(|(m, s)| m - s).collect();

    MacdSeries {
        macd,
        signal: signal_line,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_periods() {
        let values: Vec<f64> = (0..100).map(|x| x as f64).collect();
        assert!(calculate_macd(&values, 26, 12, 9).macd.is_empty());
        assert!(calculate_macd(&values, 0, 12, 9).macd.is_empty());
    }

    #[test]
    fn aligned_lengths() {
        let values: Vec<f64> = (0..100).map(|x| (x as f64 * 0.2).sin() * 10.0 + 100.0).collect();
        let out = calculate_macd(&values, 12, 26, 9);
        // 100 - 26 + 1 = 75 macd values, 75 - 9 + 1 = 67 signal values.
        assert_eq!(out.signal.len(), 67);
        assert_eq!(out.macd.len(), 67);
        assert_eq!(out.histogram.len(), 67);
    }

    #[test]
    fn flat_series_is_zero() {
        let out = calculate_macd(&[50.0; 60], 12, 26, 9);
        assert!(out.histogram.iter().all(|h| h.abs() < 1e-10));
        assert!(out.macd.iter().all(|m| m.abs() < 1e-10));
    }
}
