// =============================================================================
// Bollinger Bands
// =============================================================================
//
// A middle band (SMA), an upper band (SMA + k*σ) and a lower band
// (SMA - k*σ), computed over a sliding window of `period` values.

/// Bands for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bands over the last `period` values.
///
/// `None` when fewer than `period` values exist or the result is non-finite.
pub fn calculate_bollinger(values: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || values.len() < period {
        return None;
    }
    bands(&values[values.len() - period..], num_std)
}

/// One set of bands per full window, oldest first.
pub fn bollinger_series(values: &[f64], period: usize, num_std: f64) -> Vec<BollingerResult> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map_while(|w| bands(w, num_std))
        .collect()
}

fn bands(window: &[f64], num_std: f64) -> Option<BollingerResult> {
    let n = window.len() as f64;
    let middle = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;

    (upper.is_finite() && lower.is_finite()).then_some(BollingerResult {
        upper,
        middle,
        lower,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_basic() {
        let values: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&values, 20, 2.0).unwrap();
        assert!(bb.upper > bb.middle);
        assert!(bb.lower < bb.middle);
        assert!((bb.middle - 10.5).abs() < 1e-10);
    }

    #[test]
    fn bollinger_insufficient_data() {
        assert!(calculate_bollinger(&[1.0, 2.0, 3.0], 20, 2.0).is_none());
        assert!(bollinger_series(&[1.0, 2.0, 3.0], 20, 2.0).is_empty());
    }

    #[test]
    fn bollinger_flat() {
        let bb = calculate_bollinger(&[100.0; 20], 20, 2.0).unwrap();
        assert!((bb.upper - bb.lower).abs() < 1e-10);
    }

    #[test]
    fn series_last_matches_single() {
        let values: Vec<f64> = (0..40).map(|x| (x as f64 * 0.3).sin() * 5.0 + 50.0).collect();
        let series = bollinger_series(&values, 10, 2.0);
        assert_eq!(series.len(), 31);
        assert_eq!(series.last(), calculate_bollinger(&values, 10, 2.0).as_ref());
    }
}
