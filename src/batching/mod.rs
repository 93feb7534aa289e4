pub mod dynamic;
pub mod fixed;
pub mod rolling;

pub use dynamic::CandleDynamicBatcher;
pub use fixed::CandleBatcher;
pub use rolling::RollingCandleBatcher;

use serde::Serialize;

use crate::market_data::Candle;

/// Output of a batcher that can invalidate what it produced before.
#[derive(Debug, Clone, PartialEq)]
pub enum BatcherEvent {
    /// Every aggregate emitted so far is stale and about to be rebuilt.
    Reset,
    Candle(Candle),
}

/// Configuration key used to memoize batchers on a strategy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BatcherKey {
    Fixed {
        size: usize,
    },
    Rolling {
        history: usize,
        frequency: usize,
        allow_partial_first: bool,
    },
    Dynamic {
        size: usize,
        required_history: usize,
    },
}

impl std::fmt::Display for BatcherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatcherKey::Fixed { size } => write!(f, "fixed:{size}"),
            BatcherKey::Rolling {
                history,
                frequency,
                allow_partial_first,
            } => write!(f, "rolling:{history}:{frequency}:{allow_partial_first}"),
            BatcherKey::Dynamic {
                size,
                required_history,
            } => write!(f, "dynamic:{size}:{required_history}"),
        }
    }
}
