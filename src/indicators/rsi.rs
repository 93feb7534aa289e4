// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Step 1 — Compute price changes (deltas) from consecutive closes.
// Step 2 — Seed average gain / average loss with the SMA of the first `period`
//          gains / losses.
// Step 3 — Apply Wilder's exponential smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
// =============================================================================

use super::{Indicator, IndicatorInput, IndicatorValue, Params, Sample};
use crate::error::PipelineResult;

/// Compute the full RSI series for `closes` and `period`.
///
/// One value per close starting at index `period`. Empty when `period == 0`
/// or fewer than `period + 1` closes are available.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (sum_gain, sum_loss) = deltas[..period].iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let Some(first) = rsi_from_averages(avg_gain, avg_loss) else {
        return Vec::new();
    };

    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    result.push(first);

    for &delta in &deltas[period..] {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => result.push(rsi),
            None => break,
        }
    }

    result
}

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// Both zero gives 50 (no movement); zero loss gives 100.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}

// ---- Streaming ---------------------------------------------------------------

/// In-process RSI fed with whole candles (reads the close).
///
/// The first `interval` deltas seed the averages with their mean; Wilder
/// smoothing takes over after that. No value is produced before the seed is
/// complete.
#[derive(Debug, Clone)]
pub struct Rsi {
    interval: usize,
    last_close: Option<f64>,
    seen: usize,
    avg_gain: f64,
    avg_loss: f64,
    value: Option<f64>,
}

impl Rsi {
    pub fn new(interval: usize) -> Self {
        Self {
            interval,
            last_close: None,
            seen: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
            value: None,
        }
    }

    pub fn from_params(params: &Params) -> PipelineResult<Self> {
        let interval = super::param_period(params, "RSI", "interval", Some(14))?;
        Ok(Self::new(interval))
    }

    pub fn push(&mut self, close: f64) -> Option<f64> {
        let prev = self.last_close.replace(close)?;

        let delta = close - prev;
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        let n = self.interval as f64;

        self.seen += 1;
        if self.seen <= self.interval {
            self.avg_gain += gain / n;
            self.avg_loss += loss / n;
            if self.seen < self.interval {
                return None;
            }
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }

        self.value = rsi_from_averages(self.avg_gain, self.avg_loss);
        self.value
    }
}

impl Indicator for Rsi {
    fn input(&self) -> IndicatorInput {
        IndicatorInput::Candle
    }

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

    #[test]
    fn rsi_empty_input() {
        assert!(calculate_rsi(&[], 14).is_empty());
    }

    #[test]
    fn rsi_insufficient_data() {
        assert!(calculate_rsi(&(1..=14).map(|x| x as f64).collect::<Vec<_>>(), 14).is_empty());
    }

    #[test]
    fn rsi_all_gains() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let series = calculate_rsi(&closes, 14);
        assert!(!series.is_empty());
        for &v in &series {
            assert!((v - 100.0).abs() < 1e-10, "expected 100.0, got {v}");
        }
    }

    #[test]
    fn rsi_flat_market() {
        let series = calculate_rsi(&[100.0; 30], 14);
        for &v in &series {
            assert!((v - 50.0).abs() < 1e-10, "expected 50.0, got {v}");
        }
    }

    #[test]
    fn rsi_range_check() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        for &v in &calculate_rsi(&closes, 14) {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }

    // ---- streaming -------------------------------------------------------

    #[test]
    fn streaming_matches_batch() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        let batch = calculate_rsi(&closes, 14);

        let mut rsi = Rsi::new(14);
        let streamed: Vec<f64> = closes.iter().filter_map(|&c| rsi.push(c)).collect();
        assert_eq!(streamed.len(), batch.len());
        for (a, b) in streamed.iter().zip(&batch) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn streaming_reads_candles() {
        let rsi = Rsi::from_params(&Params::new()).unwrap();
        assert_eq!(rsi.input(), IndicatorInput::Candle);
        assert!(rsi.result().is_empty());
    }
}
