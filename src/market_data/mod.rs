pub mod candle;
pub mod candle_buffer;

// Re-export the Candle struct for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle::{aggregate, Candle};
pub use candle_buffer::{CandleBuffer, TWO_WEEKS_OF_MINUTES};
