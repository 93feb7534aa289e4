// =============================================================================
// Candle — OHLCV bar shared by every stage of the pipeline
// =============================================================================
//
// Timestamps are epoch milliseconds. `created` is only set on aggregates and
// holds the start of the last constituent small candle, which is what
// consumers compare against to tell a freshly completed aggregate apart from
// a stale one.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::PriceValue;

/// A single OHLCV bar: either a small input candle or an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    /// Volume-weighted price.
    #[serde(default)]
    pub vwp: f64,
    #[serde(default)]
    pub trades: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
}

impl Candle {
    /// Timestamp consumers use to decide whether a result is fresh.
    pub fn sync_key(&self) -> i64 {
        self.created.unwrap_or(self.start)
    }

    /// Read one of the price fields.
    pub fn price(&self, value: PriceValue) -> f64 {
        match value {
            PriceValue::Open => self.open,
            PriceValue::High => self.high,
            PriceValue::Low => self.low,
            PriceValue::Close => self.close,
            PriceValue::Vwp => self.vwp,
        }
    }

    /// `high >= max(open, close)`, `low <= min(open, close)`, `volume >= 0`.
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.volume >= 0.0
    }
}

/// Combine consecutive candles into one aggregate.
///
/// * `open` / `start` come from the first candle, `close` from the last.
/// * `high` / `low` are the extremes across the slice.
/// * `volume` and `trades` are summed.
/// * `vwp` is `Σ(vwp·volume) / Σvolume`, falling back to `open` when the
///   aggregate volume is zero.
/// * `created` is the start of the last candle.
///
/// Returns `None` for an empty slice.
pub fn aggregate(candles: &[Candle]) -> Option<Candle> {
    let first = candles.first()?;

    let mut out = Candle {
        start: first.start,
        open: first.open,
        high: f64::NEG_INFINITY,
        low: f64::INFINITY,
        close: first.close,
        volume: 0.0,
        vwp: 0.0,
        trades: 0,
        created: None,
    };

    for c in candles {
        out.high = out.high.max(c.high);
        out.low = out.low.min(c.low);
        out.close = c.close;
        out.volume += c.volume;
        out.vwp += c.vwp * c.volume;
        out.trades += c.trades;
        out.created = Some(c.start);
    }

    if out.volume != 0.0 {
        out.vwp /= out.volume;
    } else {
        out.vwp = out.open;
    }

    Some(out)
}
