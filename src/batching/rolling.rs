// =============================================================================
// Rolling Candle Batcher
// =============================================================================
//
// Keeps a sliding window of the latest `candle_history` small candles and
// re-aggregates it every `update_frequency` small candles, so windows may
// overlap. Typical configurations:
//
//   history  1, frequency  1 -> every small candle passes through unchanged
//   history 60, frequency 60 -> one hourly candle per hour
//   history 10, frequency  1 -> a 10-minute candle rolling forward each minute
//   history 1440, freq    60 -> a day's worth of data, refreshed hourly
//
// Each run splits the buffer into full `candle_history` slices and, when the
// buffer is not a multiple of the history, one trailing partial slice. Until
// the window fills for the first time the trailing partial aggregate is
// re-emitted on every qualifying tick.
// =============================================================================

use tracing::trace;

use crate::error::{PipelineError, PipelineResult};
use crate::market_data::{aggregate, Candle, CandleBuffer};

#[derive(Debug, Clone)]
pub struct RollingCandleBatcher {
    candle_history: usize,
    update_frequency: usize,
    required_history: usize,
    age: u64,
    small_candles: CandleBuffer,
}

impl RollingCandleBatcher {
    /// `allow_partial_first == false` suppresses emissions until the window
    /// has been completely filled once.
    pub fn new(
        candle_history: usize,
        update_frequency: usize,
        allow_partial_first: bool,
    ) -> PipelineResult<Self> {
        if candle_history == 0 {
            return Err(PipelineError::invalid(
                "candle_history",
                "must be a positive number of small candles",
            ));
        }
        if update_frequency == 0 {
            return Err(PipelineError::invalid(
                "update_frequency",
                "must be a positive number of small candles",
            ));
        }

        Ok(Self {
            candle_history,
            update_frequency,
            required_history: if allow_partial_first { 0 } else { candle_history },
            age: 0,
            small_candles: CandleBuffer::new(candle_history)?,
        })
    }

    pub fn candle_history(&self) -> usize {
        self.candle_history
    }

    pub fn update_frequency(&self) -> usize {
        self.update_frequency
    }

    /// Small candles written so far.
    pub fn age(&self) -> u64 {
        self.age
    }

    /// Feed small candles and collect every aggregate emitted, oldest first.
    pub fn write(&mut self, candles: &[Candle]) -> Vec<Candle> {
        let mut emitted = Vec::new();
        for candle in candles {
            self.age += 1;
            self.small_candles.push(candle.clone());

            if self.age > self.required_history as u64
                && self.age % self.update_frequency as u64 == 0
            {
                self.calculate(&mut emitted);
            }
        }
        emitted
    }

    fn calculate(&mut self, emitted: &mut Vec<Candle>) {
        let history = self.candle_history;
        let window = self.small_candles.as_slice();

        let total = window.len();
        let remainder = total % history;
        let loops = (total - remainder) / history;

        for i in 0..loops {
            let start = i * history;
            emitted.extend(aggregate(&window[start..start + history]));
        }

        if remainder > 0 {
            emitted.extend(aggregate(&window[total - remainder..total]));
        }

        trace!(
            history,
            frequency = self.update_frequency,
            age = self.age,
            loops,
            remainder,
            "rolling window aggregated"
        );
    }
}
