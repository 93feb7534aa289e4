// =============================================================================
// Shared types used across the advisor pipeline
// =============================================================================

use serde::{Deserialize, Serialize};

/// Whether candles are replayed from history or streamed from a live market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Backtest,
    Realtime,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Backtest
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backtest => write!(f, "backtest"),
            Self::Realtime => write!(f, "realtime"),
        }
    }
}

/// Position a strategy recommends holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Long,
    Short,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

impl std::str::FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            other => Err(format!("unknown recommendation `{other}`")),
        }
    }
}

/// Candle field fed to in-process indicators that consume a price stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceValue {
    Open,
    High,
    Low,
    Close,
    Vwp,
}

impl Default for PriceValue {
    fn default() -> Self {
        Self::Close
    }
}
