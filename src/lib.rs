// =============================================================================
// Trading Advisor — candle aggregation and indicator orchestration
// =============================================================================
//
// Small candles go in one at a time. They are re-aggregated by batchers,
// rolled into bounded property caches, fed to in-process and asynchronous
// indicators, and handed to a strategy's decision hooks exactly once each,
// in arrival order. Worker processes report back over a JSON-lines protocol
// consolidated by the supervisor.
// =============================================================================

pub mod advisor;
pub mod backend;
pub mod batching;
pub mod chart;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod props_cache;
pub mod runtime_config;
pub mod types;
pub mod worker;

pub use advisor::{MethodContext, Strategy, TradingMethod};
pub use error::{PipelineError, PipelineResult};
pub use market_data::Candle;
