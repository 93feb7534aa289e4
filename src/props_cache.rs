// =============================================================================
// Candle Properties Cache
// =============================================================================
//
// Seven bounded parallel series (open, high, low, close, volume, vwp, trades)
// fed either straight from small candles (window 1) or from the aggregates of
// an owned rolling batcher (window > 1). Indicator backends read these series
// as their input arrays. All seven always have the same length.
// =============================================================================

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::trace;

use crate::batching::RollingCandleBatcher;
use crate::error::{PipelineError, PipelineResult};
use crate::market_data::Candle;

/// Default number of values retained per property series.
pub const DEFAULT_CACHE_SIZE: usize = 1_000;

/// Names of the series in the order they are stored.
pub const PROPERTY_NAMES: [&str; 7] = ["open", "high", "low", "close", "volume", "vwp", "trades"];

/// Identifies one cache instance: `(window, update_frequency)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey {
    pub window: usize,
    pub frequency: usize,
}

impl CacheKey {
    /// A frequency of 0 means "refresh once per full window".
    pub fn new(window: usize, frequency: usize) -> Self {
        Self {
            window,
            frequency: if frequency == 0 { window } else { frequency },
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.window, self.frequency)
    }
}

// ── Snapshot handed to backends ─────────────────────────────────────────────

/// Owned copy of the cached series at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandleProps {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    pub vwp: Vec<f64>,
    pub trades: Vec<f64>,
}

impl CandleProps {
    /// Look a series up by its property name.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        let series = match name {
            "open" => &self.open,
            "high" => &self.high,
            "low" => &self.low,
            "close" => &self.close,
            "volume" => &self.volume,
            "vwp" => &self.vwp,
            "trades" => &self.trades,
            _ => return None,
        };
        Some(series)
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Name → series view, in storage order.
    pub fn as_map(&self) -> BTreeMap<&'static str, &[f64]> {
        PROPERTY_NAMES
            .iter()
            .filter_map(|&name| self.get(name).map(|s| (name, s)))
            .collect()
    }
}

// ── Cache ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CandlePropsCache {
    key: CacheKey,
    cache_size: usize,
    batcher: Option<RollingCandleBatcher>,
    series: [VecDeque<f64>; 7],
    age: u64,
    last_update: Option<i64>,
}

impl CandlePropsCache {
    pub fn new(candle_history: usize, update_frequency: usize, cache_size: usize) -> PipelineResult<Self> {
        if candle_history == 0 {
            return Err(PipelineError::invalid(
                "candle_history",
                "must be a positive number of small candles",
            ));
        }
        if cache_size == 0 {
            return Err(PipelineError::invalid("cache_size", "must be positive"));
        }

        let key = CacheKey::new(candle_history, update_frequency);
        let batcher = if candle_history > 1 {
            Some(RollingCandleBatcher::new(key.window, key.frequency, true)?)
        } else {
            None
        };

        Ok(Self {
            key,
            cache_size,
            batcher,
            series: Default::default(),
            age: 0,
            last_update: None,
        })
    }

    pub fn key(&self) -> CacheKey {
        self.key
    }

    pub fn capacity(&self) -> usize {
        self.cache_size
    }

    /// Candles accepted into the series so far.
    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn len(&self) -> usize {
        self.series[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.series[0].is_empty()
    }

    /// Sync key (`created`, else `start`) of the most recently accepted candle.
    pub fn last_update(&self) -> Option<i64> {
        self.last_update
    }

    /// Feed small candles. Returns the candles that were accepted into the
    /// series: the small candles themselves for window 1, otherwise whatever
    /// the rolling batcher emitted.
    pub fn write(&mut self, candles: &[Candle]) -> Vec<Candle> {
        let accepted = match self.batcher.as_mut() {
            Some(batcher) => batcher.write(candles),
            None => candles.to_vec(),
        };

        for candle in &accepted {
            self.accept(candle);
        }
        accepted
    }

    fn accept(&mut self, candle: &Candle) {
        let values = [
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            candle.volume,
            candle.vwp,
            candle.trades as f64,
        ];

        for (series, value) in self.series.iter_mut().zip(values) {
            series.push_back(value);
        }
        self.age += 1;

        if self.age as usize > self.cache_size {
            for series in self.series.iter_mut() {
                series.pop_front();
            }
        }

        self.last_update = Some(candle.sync_key());
        trace!(key = %self.key, len = self.len(), sync = candle.sync_key(), "props cache updated");
    }

    /// Copy the current series out for a backend computation.
    pub fn snapshot(&self) -> CandleProps {
        let [open, high, low, close, volume, vwp, trades] =
            self.series.clone().map(Vec::from);
        CandleProps {
            open,
            high,
            low,
            close,
            volume,
            vwp,
            trades,
        }
    }
}
