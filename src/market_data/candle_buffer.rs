use std::collections::VecDeque;

use tracing::trace;

use super::Candle;
use crate::error::{PipelineError, PipelineResult};

/// Two weeks of one-minute candles.
pub const TWO_WEEKS_OF_MINUTES: usize = 20_160;

// ---------------------------------------------------------------------------
// CandleBuffer -- bounded FIFO of small candles
// ---------------------------------------------------------------------------

/// Insertion-ordered ring of the most recent small candles.
///
/// New candles go to the tail; once the ring grows past `max_candles` the
/// oldest entries are dropped from the head. After every [`push`] the length
/// is at most `max_candles`.
///
/// [`push`]: CandleBuffer::push
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    ring: VecDeque<Candle>,
    max_candles: usize,
}

impl CandleBuffer {
    /// Create a buffer that retains at most `max_candles` candles.
    pub fn new(max_candles: usize) -> PipelineResult<Self> {
        if max_candles == 0 {
            return Err(PipelineError::invalid(
                "max_candles",
                "buffer capacity must be positive",
            ));
        }
        Ok(Self {
            // Large capacities (two weeks of minutes) grow on demand.
            ring: VecDeque::with_capacity((max_candles + 1).min(1_024)),
            max_candles,
        })
    }

    /// Append a candle, evicting from the head if the ring is over budget.
    /// Returns the evicted candle, if any.
    pub fn push(&mut self, candle: Candle) -> Option<Candle> {
        self.ring.push_back(candle);
        if self.ring.len() > self.max_candles {
            let evicted = self.ring.pop_front();
            trace!(capacity = self.max_candles, "candle buffer evicted oldest entry");
            evicted
        } else {
            None
        }
    }

    /// Contiguous oldest-first view of the buffered candles.
    pub fn as_slice(&mut self) -> &[Candle] {
        self.ring.make_contiguous()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.ring.iter()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.ring.back()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_candles
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::candle::test_support::{minute, series};
    use proptest::prelude::*;

    #[test]
    fn zero_capacity_rejected() {
        assert!(CandleBuffer::new(0).is_err());
    }

    #[test]
    fn ring_buffer_trimming() {
        let mut buf = CandleBuffer::new(3).unwrap();
        for i in 0..5 {
            buf.push(minute(i, 100.0 + i as f64, 1.0));
        }

        assert_eq!(buf.len(), 3);
        let closes: Vec<f64> = buf.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn push_reports_evicted_head() {
        let mut buf = CandleBuffer::new(2).unwrap();
        assert!(buf.push(minute(0, 1.0, 1.0)).is_none());
        assert!(buf.push(minute(1, 2.0, 1.0)).is_none());
        let evicted = buf.push(minute(2, 3.0, 1.0)).unwrap();
        assert_eq!(evicted.close, 1.0);
        assert_eq!(buf.last().map(|c| c.close), Some(3.0));
    }

    #[test]
    fn slice_is_oldest_first_after_wrap() {
        let mut buf = CandleBuffer::new(4).unwrap();
        for c in series(10) {
            buf.push(c);
        }
        let starts: Vec<i64> = buf.as_slice().iter().map(|c| c.start / 60_000).collect();
        assert_eq!(starts, vec![6, 7, 8, 9]);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(capacity in 1usize..64, len in 0usize..512) {
            let mut buf = CandleBuffer::new(capacity).unwrap();
            for c in series(len) {
                buf.push(c);
                prop_assert!(buf.len() <= capacity);
            }
            prop_assert_eq!(buf.len(), len.min(capacity));
        }
    }
}
