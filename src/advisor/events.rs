// =============================================================================
// Observation events
// =============================================================================
//
// Everything a strategy instance reports to the outside world. Events are
// queued while a tick runs and delivered on the channel once the tick's
// synchronous work has completed.
// =============================================================================

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::batching::BatcherKey;
use crate::chart::ChartSpec;
use crate::market_data::Candle;
use crate::types::Recommendation;

pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A dynamic batcher is about to rebuild every aggregate it produced.
    Reset { batcher: BatcherKey },
    /// A small candle was admitted into the pipeline.
    Candle { candle: Candle },
    /// An aggregate produced by one of the strategy's batchers. After a
    /// `Reset` from the same batcher these are the rebuilt aggregates.
    Batched { batcher: BatcherKey, candle: Candle },
    Advice(AdviceEvent),
    IndicatorResult(IndicatorResultEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdviceEvent {
    pub recommendation: Recommendation,
    /// Always 1: the whole portfolio follows the recommendation.
    pub portfolio: u32,
    pub candle: Option<Candle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorResultEvent {
    pub name: String,
    /// Start of the small candle the result belongs to.
    pub date: i64,
    pub result: Value,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub indicator_type: Option<String>,
    pub chart: ChartSpec,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn advice_wire_shape() {
        let event = AdviceEvent {
            recommendation: Recommendation::Long,
            portfolio: 1,
            candle: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "recommendation": "long", "portfolio": 1, "candle": null })
        );
    }

    #[test]
    fn indicator_result_wire_shape() {
        let event = IndicatorResultEvent {
            name: "ema".into(),
            date: 60_000,
            result: json!({ "result": 1.5 }),
            indicator_type: Some("native-ema".into()),
            chart: ChartSpec::default(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "native-ema");
        assert_eq!(value["date"], 60_000);
        assert_eq!(value["result"]["result"], 1.5);
        assert_eq!(value["chart"], json!({}));
    }
}
