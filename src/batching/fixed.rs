// =============================================================================
// Fixed Candle Batcher
// =============================================================================
//
// Collects exactly `candle_size` consecutive small candles and emits them as
// one aggregate. Nothing carries over between emissions: once a batch is
// emitted the next candle starts a fresh buffer.
// =============================================================================

use tracing::trace;

use crate::error::{PipelineError, PipelineResult};
use crate::market_data::{aggregate, Candle};

#[derive(Debug, Clone)]
pub struct CandleBatcher {
    candle_size: usize,
    small_candles: Vec<Candle>,
}

impl CandleBatcher {
    /// Create a batcher emitting one aggregate per `candle_size` small candles.
    pub fn new(candle_size: usize) -> PipelineResult<Self> {
        if candle_size == 0 {
            return Err(PipelineError::invalid(
                "candle_size",
                "must be a positive number of small candles",
            ));
        }
        Ok(Self {
            candle_size,
            small_candles: Vec::with_capacity(candle_size),
        })
    }

    pub fn candle_size(&self) -> usize {
        self.candle_size
    }

    /// Number of small candles waiting for the current batch to fill.
    pub fn pending(&self) -> usize {
        self.small_candles.len()
    }

    /// Feed small candles, returning every aggregate completed along the way
    /// (oldest first).
    pub fn write(&mut self, candles: &[Candle]) -> Vec<Candle> {
        let mut emitted = Vec::new();
        for candle in candles {
            if let Some(out) = self.push(candle.clone()) {
                emitted.push(out);
            }
        }
        emitted
    }

    /// Feed a single small candle.
    pub fn push(&mut self, candle: Candle) -> Option<Candle> {
        self.small_candles.push(candle);
        if self.small_candles.len() < self.candle_size {
            return None;
        }

        let out = aggregate(&self.small_candles);
        self.small_candles.clear();
        if let Some(ref c) = out {
            trace!(size = self.candle_size, start = c.start, "fixed batch emitted");
        }
        out
    }

    /// Drop any partially filled batch.
    pub fn reset(&mut self) {
        self.small_candles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::candle::test_support::{minute, series};
    use proptest::prelude::*;

    #[test]
    fn zero_size_is_configuration_error() {
        let err = CandleBatcher::new(0).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn size_three_over_six_volumes() {
        let mut batcher = CandleBatcher::new(3).unwrap();
        let candles: Vec<Candle> = (1..=6).map(|v| minute(v, 100.0, v as f64)).collect();

        let out = batcher.write(&candles);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].volume, 6.0);
        assert_eq!(out[1].volume, 15.0);
        assert_eq!(batcher.pending(), 0);
    }

    #[test]
    fn remainder_waits_for_next_write() {
        let mut batcher = CandleBatcher::new(4).unwrap();
        let candles = series(6);
        assert_eq!(batcher.write(&candles[..3]).len(), 0);
        assert_eq!(batcher.pending(), 3);

        let out = batcher.write(&candles[3..]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start, candles[0].start);
        assert_eq!(out[0].close, candles[3].close);
        assert_eq!(batcher.pending(), 2);
    }

    #[test]
    fn reset_discards_partial_batch() {
        let mut batcher = CandleBatcher::new(2).unwrap();
        batcher.write(&series(1));
        batcher.reset();
        assert_eq!(batcher.pending(), 0);
        assert!(batcher.write(&series(1)).is_empty());
    }

    #[test]
    fn refeeding_constituents_reproduces_ohlc() {
        let candles: Vec<Candle> = (0..5)
            .map(|i| {
                let mut c = minute(i, 100.0 + (i as f64 * 1.7).sin() * 3.0, 2.0 + i as f64);
                c.high += i as f64;
                c
            })
            .collect();

        let original = CandleBatcher::new(5).unwrap().write(&candles).remove(0);
        let again = CandleBatcher::new(5).unwrap().write(&candles).remove(0);
        assert_eq!(original.open, again.open);
        assert_eq!(original.high, again.high);
        assert_eq!(original.low, again.low);
        assert_eq!(original.close, again.close);
    }

    proptest! {
        #[test]
        fn emits_floor_count_over_size(size in 1usize..12, volumes in prop::collection::vec(0.0f64..1_000.0, 0..200)) {
            let candles: Vec<Candle> = volumes
                .iter()
                .enumerate()
                .map(|(i, &v)| minute(i as i64, 50.0, v))
                .collect();

            let mut batcher = CandleBatcher::new(size).unwrap();
            let out = batcher.write(&candles);
            prop_assert_eq!(out.len(), candles.len() / size);

            for (i, agg) in out.iter().enumerate() {
                let expected: f64 = volumes[i * size..(i + 1) * size].iter().sum();
                prop_assert!((agg.volume - expected).abs() < 1e-6);
            }
        }
    }
}
