// =============================================================================
// Dynamic Candle Batcher
// =============================================================================
//
// Wraps a fixed batcher and rebuilds its output from scratch on every write:
// the retained history (up to two weeks of small candles) is trimmed from the
// front to a multiple of the candle size and replayed through a freshly reset
// fixed batcher. Consumers receive a `Reset` first so they drop previously
// stored aggregates instead of appending to them. This is what lets the
// aggregation size change at runtime without restarting the pipeline.
// =============================================================================

use tracing::debug;

use super::{BatcherEvent, CandleBatcher};
use crate::error::{PipelineError, PipelineResult};
use crate::market_data::{Candle, CandleBuffer};

#[derive(Debug, Clone)]
pub struct CandleDynamicBatcher {
    batcher: CandleBatcher,
    required_history: usize,
    age: u64,
    small_candles: CandleBuffer,
}

impl CandleDynamicBatcher {
    pub fn new(
        candle_size: usize,
        required_history: usize,
        history_size: usize,
    ) -> PipelineResult<Self> {
        Ok(Self {
            batcher: CandleBatcher::new(candle_size)?,
            required_history,
            age: 0,
            small_candles: CandleBuffer::new(history_size)?,
        })
    }

    pub fn candle_size(&self) -> usize {
        self.batcher.candle_size()
    }

    pub fn history_len(&self) -> usize {
        self.small_candles.len()
    }

    /// Change the aggregation size. The next write rebuilds every aggregate
    /// from the retained history with the new size.
    pub fn set_candle_size(&mut self, candle_size: usize) -> PipelineResult<()> {
        if candle_size == 0 {
            return Err(PipelineError::invalid(
                "candle_size",
                "must be a positive number of small candles",
            ));
        }
        debug!(
            from = self.batcher.candle_size(),
            to = candle_size,
            "dynamic batcher resized"
        );
        self.batcher = CandleBatcher::new(candle_size)?;
        Ok(())
    }

    /// Feed small candles. Every candle written once enough history exists
    /// yields a `Reset` followed by the re-derived aggregates.
    pub fn write(&mut self, candles: &[Candle]) -> Vec<BatcherEvent> {
        let mut events = Vec::new();
        for candle in candles {
            self.age += 1;
            self.small_candles.push(candle.clone());

            if self.age > self.required_history as u64 {
                events.push(BatcherEvent::Reset);
                events.extend(self.process().map(BatcherEvent::Candle));
            }
        }
        events
    }

    /// Replay the retained history through the reset fixed batcher.
    fn process(&mut self) -> impl Iterator<Item = Candle> + '_ {
        self.batcher.reset();

        let size = self.batcher.candle_size();
        let history = self.small_candles.as_slice();
        let remainder = history.len() % size;

        let batcher = &mut self.batcher;
        history[remainder..]
            .iter()
            .filter_map(move |c| batcher.push(c.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::candle::test_support::series;

    fn candles_of(events: &[BatcherEvent]) -> Vec<&Candle> {
        events
            .iter()
            .filter_map(|e| match e {
                BatcherEvent::Candle(c) => Some(c),
                BatcherEvent::Reset => None,
            })
            .collect()
    }

    #[test]
    fn reset_precedes_replayed_aggregates() {
        let mut batcher = CandleDynamicBatcher::new(2, 0, 100).unwrap();
        let candles = series(4);
        batcher.write(&candles[..3]);

        let events = batcher.write(&candles[3..]);
        assert_eq!(events[0], BatcherEvent::Reset);
        let out = candles_of(&events);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].start, candles[0].start);
        assert_eq!(out[1].start, candles[2].start);
    }

    #[test]
    fn front_remainder_is_discarded() {
        let mut batcher = CandleDynamicBatcher::new(3, 0, 100).unwrap();
        let candles = series(7);
        let events = batcher.write(&candles);

        // The final rebuild replays candles 1..7 (7 % 3 == 1 dropped).
        let last_reset = events.iter().rposition(|e| *e == BatcherEvent::Reset).unwrap();
        let rebuilt = candles_of(&events[last_reset..]);
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt[0].start, candles[1].start);
        assert_eq!(rebuilt[1].start, candles[4].start);
        assert_eq!(rebuilt[1].created, Some(candles[6].start));
    }

    #[test]
    fn waits_for_required_history() {
        let mut batcher = CandleDynamicBatcher::new(2, 3, 100).unwrap();
        let candles = series(4);
        assert!(batcher.write(&candles[..3]).is_empty());
        assert_eq!(batcher.write(&candles[3..])[0], BatcherEvent::Reset);
    }

    #[test]
    fn history_is_capped() {
        let mut batcher = CandleDynamicBatcher::new(2, 0, 10).unwrap();
        batcher.write(&series(50));
        assert_eq!(batcher.history_len(), 10);
    }

    #[test]
    fn resize_rebuilds_with_new_size() {
        let mut batcher = CandleDynamicBatcher::new(2, 0, 100).unwrap();
        let candles = series(9);
        batcher.write(&candles[..8]);

        batcher.set_candle_size(3).unwrap();
        let events = batcher.write(&candles[8..]);
        let out = candles_of(&events);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|c| c.volume == 3.0));
        assert!(batcher.set_candle_size(0).is_err());
    }
}
