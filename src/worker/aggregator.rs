// =============================================================================
// Result Aggregator — consolidates a worker's message stream
// =============================================================================
//
// Candles, trades and roundtrips are appended in arrival order, the report is
// last-value-wins and indicator results are grouped by indicator name with a
// `timestamp → result` map. The consolidated result is handed out exactly
// once, when the worker exits cleanly; a non-zero exit discards it.
// =============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info};

use super::protocol::{IndicatorResultMessage, WorkerLine, WorkerMessage};
use crate::error::{PipelineError, PipelineResult};
use crate::market_data::Candle;

/// Everything one indicator reported over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSeries {
    /// Latest value of every field other than `date` and `result`.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub results: BTreeMap<i64, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub trades: Vec<Value>,
    pub candles: Vec<Candle>,
    pub report: Option<Value>,
    pub roundtrips: Vec<Value>,
    pub indicator_results: BTreeMap<String, IndicatorSeries>,
}

#[derive(Debug, Default)]
pub struct ResultAggregator {
    result: BacktestResult,
    messages: u64,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> u64 {
        self.messages
    }

    /// Parse and record one stdout line. Blank lines are skipped.
    pub fn ingest_line(&mut self, line: &str) -> PipelineResult<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        self.record(WorkerLine::parse(line)?);
        Ok(())
    }

    pub fn record(&mut self, line: WorkerLine) {
        match line {
            WorkerLine::Log { log } => info!(target: "worker", "{log}"),
            WorkerLine::Message(message) => {
                self.messages += 1;
                self.message(message);
            }
        }
    }

    fn message(&mut self, message: WorkerMessage) {
        let result = &mut self.result;
        match message {
            WorkerMessage::Candle { candle } => result.candles.push(candle),
            WorkerMessage::Trade { trade } => result.trades.push(trade),
            WorkerMessage::Roundtrip { roundtrip } => result.roundtrips.push(roundtrip),
            WorkerMessage::Report { report } => result.report = Some(report),
            WorkerMessage::IndicatorResult { indicator_result } => {
                let IndicatorResultMessage {
                    name,
                    date,
                    result: value,
                    extra,
                } = indicator_result;

                let series = result.indicator_results.entry(name.clone()).or_default();
                series.fields.insert("name".into(), Value::String(name));
                series.fields.extend(extra);
                series.results.insert(date, value);
            }
        }
    }

    /// Close the stream with the worker's exit status.
    pub fn exit(self, status: Option<i32>, stderr_tail: Vec<String>) -> PipelineResult<BacktestResult> {
        if status != Some(0) {
            error!(
                ?status,
                messages = self.messages,
                stderr_lines = stderr_tail.len(),
                "worker died, discarding its results"
            );
            return Err(PipelineError::ProcessDeath { status, stderr_tail });
        }

        info!(
            candles = self.result.candles.len(),
            trades = self.result.trades.len(),
            indicators = self.result.indicator_results.len(),
            "worker finished"
        );
        Ok(self.result)
    }
}
