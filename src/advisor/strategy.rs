use serde_json::Value;

use super::context::MethodContext;
use crate::market_data::Candle;

/// Decision logic plugged into a [`TradingMethod`](super::TradingMethod).
///
/// `init` runs once, before the first candle; it is the only place
/// indicators can be added. After that, for every small candle in arrival
/// order, `update` always runs and `check` runs once enough history has
/// accumulated. Any hook error is fatal for the instance.
pub trait Strategy: Send {
    fn init(&mut self, ctx: &mut MethodContext) -> anyhow::Result<()>;

    fn update(&mut self, _ctx: &mut MethodContext, _candle: &Candle) -> anyhow::Result<()> {
        Ok(())
    }

    fn check(&mut self, ctx: &mut MethodContext, candle: &Candle) -> anyhow::Result<()>;

    fn on_trade(&mut self, _ctx: &mut MethodContext, _trade: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    fn end(&mut self, _ctx: &mut MethodContext) -> anyhow::Result<()> {
        Ok(())
    }
}
