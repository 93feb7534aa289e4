// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices than the Simple Moving Average.
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = price_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The batch form seeds with the SMA of the first `period` values. The
// streaming form seeds with the first sample it sees, so it produces a value
// from the very first update.
// =============================================================================

use super::{Indicator, IndicatorValue, Params, Sample};
use crate::error::PipelineResult;

/// Compute the EMA series for `values` and look-back `period`.
///
/// Returns an empty `Vec` when the input is too short or the period is zero.
/// Each output element corresponds to an input starting at index `period - 1`.
/// A non-finite intermediate value truncates the series.
pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let sma: f64 = values[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(values.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &value in &values[period..] {
        let ema = value * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    result
}

// ---- Streaming ---------------------------------------------------------------

/// In-process EMA updated once per candle with the configured price.
#[derive(Debug, Clone)]
pub struct Ema {
    weight: usize,
    multiplier: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(weight: usize) -> Self {
        Self {
            weight,
            multiplier: 2.0 / (weight + 1) as f64,
            value: None,
        }
    }

    pub fn from_params(params: &Params) -> PipelineResult<Self> {
        let weight = super::param_period(params, "EMA", "weight", None)?;
        Ok(Self::new(weight))
    }

    pub fn weight(&self) -> usize {
        self.weight
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn push(&mut self, price: f64) -> f64 {
        let next = match self.value {
            None => price,
            Some(prev) => price * self.multiplier + prev * (1.0 - self.multiplier),
        };
        self.value = Some(next);
        next
    }
}

impl Indicator for Ema {
    fn update(&mut self, sample: Sample<'_>) {
        self.push(sample.price());
    }

    fn result(&self) -> IndicatorValue {
        self.value.into()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    // ---- calculate_ema ---------------------------------------------------

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn ema_period_equals_length() {
        let ema = calculate_ema(&[2.0, 4.0, 6.0], 3);
        assert_eq!(ema.len(), 1);
        assert!((ema[0] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        let values: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema = calculate_ema(&values, 5);
        assert_eq!(ema.len(), 6);

        let mult = 2.0 / 6.0;
        let mut expected = 3.0;
        let mut expected_vec = vec![expected];
        for &c in &values[5..] {
            expected = c * mult + expected * (1.0 - mult);
            expected_vec.push(expected);
        }
        for (a, b) in ema.iter().zip(expected_vec.iter()) {
            assert!((a - b).abs() < 1e-10, "got {a}, expected {b}");
        }
    }

    #[test]
    fn ema_handles_nan_in_input() {
        let ema = calculate_ema(&[1.0, 2.0, 3.0, f64::NAN, 5.0], 3);
        assert_eq!(ema.len(), 1);
    }

    // ---- streaming -------------------------------------------------------

    #[test]
    fn streaming_seeds_with_first_price() {
        let mut ema = Ema::new(3);
        assert!(ema.result().is_empty());
        assert_eq!(ema.push(10.0), 10.0);
        // multiplier 0.5
        assert!((ema.push(20.0) - 15.0).abs() < 1e-10);
        assert_eq!(ema.result().as_scalar(), Some(15.0));
    }

    #[test]
    fn from_params_requires_weight() {
        let params = serde_json::json!({ "weight": 21 });
        let ema = Ema::from_params(params.as_object().unwrap()).unwrap();
        assert_eq!(ema.weight(), 21);
        assert!(Ema::from_params(&Params::new()).is_err());
    }
}
