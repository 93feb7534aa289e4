// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================

use std::collections::VecDeque;

use super::{Indicator, IndicatorValue, Params, Sample};
use crate::error::PipelineResult;

/// SMA series, one value per input starting at index `period - 1`.
pub fn calculate_sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}

/// In-process SMA over the last `window` prices. Until the window fills the
/// average covers whatever has been seen.
#[derive(Debug, Clone)]
pub struct Sma {
    window: usize,
    prices: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            prices: VecDeque::with_capacity(window + 1),
            sum: 0.0,
        }
    }

    pub fn from_params(params: &Params) -> PipelineResult<Self> {
        let window = super::param_period(params, "SMA", "window", None)?;
        Ok(Self::new(window))
    }

    pub fn push(&mut self, price: f64) -> f64 {
        self.prices.push_back(price);
        self.sum += price;
        if self.prices.len() > self.window {
            if let Some(old) = self.prices.pop_front() {
                self.sum -= old;
            }
        }
        self.sum / self.prices.len() as f64
    }
}

impl Indicator for Sma {
    fn update(&mut self, sample: Sample<'_>) {
        self.push(sample.price());
    }

    fn result(&self) -> IndicatorValue {
        if self.prices.is_empty() {
            IndicatorValue::Empty
        } else {
            IndicatorValue::Scalar(self.sum / self.prices.len() as f64)
        }
    }
}
