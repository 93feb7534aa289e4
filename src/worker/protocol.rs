// =============================================================================
// Worker protocol — JSON lines between a worker process and its supervisor
// =============================================================================
//
// Every stdout line of a worker is one JSON object: either a typed message
// (`{"type": "candle", "candle": {...}}`) or a free-form log line
// (`{"log": "..."}`). Human-oriented tracing output goes to stderr.
// =============================================================================

use std::io::Write;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::advisor::{IndicatorResultEvent, PipelineEvent};
use crate::error::PipelineResult;
use crate::market_data::Candle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerMessage {
    Candle {
        candle: Candle,
    },
    Trade {
        trade: Value,
    },
    Roundtrip {
        roundtrip: Value,
    },
    Report {
        report: Value,
    },
    IndicatorResult {
        #[serde(rename = "indicatorResult")]
        indicator_result: IndicatorResultMessage,
    },
}

/// Indicator result as carried on the wire. Everything besides `name`,
/// `date` and `result` is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResultMessage {
    pub name: String,
    pub date: i64,
    #[serde(default)]
    pub result: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<IndicatorResultEvent> for IndicatorResultMessage {
    fn from(event: IndicatorResultEvent) -> Self {
        let mut extra = Map::new();
        if let Some(indicator_type) = event.indicator_type {
            extra.insert("type".into(), Value::String(indicator_type));
        }
        extra.insert("chart".into(), Value::Object(event.chart.0));
        Self {
            name: event.name,
            date: event.date,
            result: event.result,
            extra,
        }
    }
}

/// Any line a worker may print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerLine {
    Message(WorkerMessage),
    Log { log: String },
}

impl WorkerLine {
    pub fn parse(line: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

// ── Emitter ─────────────────────────────────────────────────────────────────

/// Writes protocol lines for the worker side.
pub struct WorkerEmitter<W: Write> {
    out: W,
    written: u64,
}

impl<W: Write> WorkerEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn emit(&mut self, line: &WorkerLine) -> PipelineResult<()> {
        serde_json::to_writer(&mut self.out, line)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn message(&mut self, message: WorkerMessage) -> PipelineResult<()> {
        self.emit(&WorkerLine::Message(message))
    }

    pub fn log(&mut self, text: impl Into<String>) -> PipelineResult<()> {
        self.emit(&WorkerLine::Log { log: text.into() })
    }

    /// Forward an observation event. Advice is reported as a log line.
    /// Batcher output stays in-process: the `candle` stream of a run carries
    /// small candles only, so resets and aggregates are not written.
    pub fn event(&mut self, event: PipelineEvent) -> PipelineResult<()> {
        match event {
            PipelineEvent::Candle { candle } => self.message(WorkerMessage::Candle { candle }),
            PipelineEvent::IndicatorResult(result) => self.message(WorkerMessage::IndicatorResult {
                indicator_result: result.into(),
            }),
            PipelineEvent::Advice(advice) => {
                let at = advice.candle.as_ref().map(|c| c.start).unwrap_or_default();
                self.log(format!("advice {} at {at}", advice.recommendation))
            }
            PipelineEvent::Reset { .. } | PipelineEvent::Batched { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::AdviceEvent;
    use crate::chart::ChartSpec;
    use crate::market_data::candle::test_support::minute;
    use crate::types::Recommendation;
    use serde_json::json;

    #[test]
    fn parses_typed_messages_and_logs() {
        let line = WorkerLine::parse(r#"{"type":"report","report":{"profit":1.5}}"#).unwrap();
        assert_eq!(
            line,
            WorkerLine::Message(WorkerMessage::Report {
                report: json!({ "profit": 1.5 })
            })
        );

        let line = WorkerLine::parse(r#"{"log":"hello"}"#).unwrap();
        assert_eq!(line, WorkerLine::Log { log: "hello".into() });

        assert!(WorkerLine::parse("not json").is_err());
        assert!(WorkerLine::parse(r#"{"type":"unknown"}"#).is_err());
    }

    #[test]
    fn indicator_result_keeps_extra_fields() {
        let raw = json!({
            "type": "indicatorResult",
            "indicatorResult": {
                "name": "rsi", "date": 60000, "result": 55.0,
                "type": "native-rsi", "chart": {}
            }
        });
        let msg: WorkerMessage = serde_json::from_value(raw).unwrap();
        let WorkerMessage::IndicatorResult { indicator_result } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(indicator_result.name, "rsi");
        assert_eq!(indicator_result.extra["type"], "native-rsi");
        assert!(!indicator_result.extra.contains_key("date"));
    }

    #[test]
    fn emitter_writes_one_line_per_event() {
        let mut emitter = WorkerEmitter::new(Vec::new());
        emitter
            .event(PipelineEvent::Candle { candle: minute(1, 10.0, 1.0) })
            .unwrap();
        emitter
            .event(PipelineEvent::Advice(AdviceEvent {
                recommendation: Recommendation::Short,
                portfolio: 1,
                candle: Some(minute(1, 10.0, 1.0)),
            }))
            .unwrap();
        emitter
            .event(PipelineEvent::IndicatorResult(IndicatorResultEvent {
                name: "ema".into(),
                date: 60_000,
                result: json!(10.0),
                indicator_type: None,
                chart: ChartSpec::default(),
            }))
            .unwrap();
        emitter
            .event(PipelineEvent::Batched {
                batcher: crate::batching::BatcherKey::Fixed { size: 2 },
                candle: minute(0, 10.0, 2.0),
            })
            .unwrap();
        assert_eq!(emitter.written(), 3);

        let out = String::from_utf8(emitter.into_inner()).unwrap();
        let lines: Vec<Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines[0]["type"], "candle");
        assert_eq!(lines[1]["log"], "advice short at 60000");
        assert_eq!(lines[2]["indicatorResult"]["name"], "ema");
        assert_eq!(lines[2]["indicatorResult"]["chart"], json!({}));
    }
}
