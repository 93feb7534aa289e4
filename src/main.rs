// =============================================================================
// advisor-worker — replays candles through a strategy and reports back
// =============================================================================
//
// Reads one JSON candle per stdin line, runs it through the demo RSI/EMA
// strategy and writes protocol lines (candles, indicator results, logs and a
// final report) to stdout. Human logs go to stderr. A non-zero exit tells the
// supervisor the run failed.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use trading_advisor::advisor::{IndicatorOptions, MethodContext, PipelineEvent, Strategy, TradingMethod};
use trading_advisor::backend::{default_backends, NATIVE_BACKEND};
use trading_advisor::chart::ChartSpec;
use trading_advisor::indicators::{IndicatorRegistry, Params};
use trading_advisor::runtime_config::AdvisorConfig;
use trading_advisor::types::Recommendation;
use trading_advisor::worker::{WorkerEmitter, WorkerMessage};
use trading_advisor::Candle;

/// Candles buffered between the stdin reader and the pipeline.
const CANDLE_QUEUE: usize = 1024;

// ── Demo strategy ───────────────────────────────────────────────────────────

/// RSI mean reversion, confirmed by price being on the right side of an EMA.
struct RsiReversion {
    rsi_period: u64,
    oversold: f64,
    overbought: f64,
    candles: u64,
    first_close: Option<f64>,
    last_close: Option<f64>,
}

impl Default for RsiReversion {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            oversold: 30.0,
            overbought: 70.0,
            candles: 0,
            first_close: None,
            last_close: None,
        }
    }
}

impl Strategy for RsiReversion {
    fn init(&mut self, ctx: &mut MethodContext) -> anyhow::Result<()> {
        let mut ema = Params::new();
        ema.insert("weight".into(), json!(21));
        ctx.add_indicator("ema", "EMA", ema, IndicatorOptions::default())?;

        let mut rsi = Params::new();
        rsi.insert("period".into(), json!(self.rsi_period));
        ctx.add_async_indicator(
            "rsi",
            NATIVE_BACKEND,
            "rsi",
            rsi,
            IndicatorOptions::default().chart(ChartSpec::for_indicator("rsi", None)),
        )?;

        ctx.set_required_history(self.rsi_period + 1);
        Ok(())
    }

    fn update(&mut self, _ctx: &mut MethodContext, candle: &Candle) -> anyhow::Result<()> {
        self.candles += 1;
        self.first_close.get_or_insert(candle.close);
        self.last_close = Some(candle.close);
        Ok(())
    }

    fn check(&mut self, ctx: &mut MethodContext, candle: &Candle) -> anyhow::Result<()> {
        let (Some(rsi), Some(ema)) = (ctx.indicator_value("rsi"), ctx.indicator_value("ema")) else {
            return Ok(());
        };
        debug!(rsi, ema, close = candle.close, "demo check");

        let advice = if rsi < self.oversold && candle.close < ema {
            Some(Recommendation::Long)
        } else if rsi > self.overbought && candle.close > ema {
            Some(Recommendation::Short)
        } else {
            None
        };
        ctx.advice(advice, Some(candle));
        Ok(())
    }
}

// ── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::var("ADVISOR_CONFIG") {
        Ok(path) => AdvisorConfig::load_or_default(&path)?,
        Err(_) => {
            warn!("ADVISOR_CONFIG not set, using default configuration");
            AdvisorConfig::default()
        }
    };
    info!(mode = %config.mode, candle_size = config.candle_size, "advisor worker starting");

    let registry = IndicatorRegistry::builtin();
    registry.validate().context("indicator registry is inconsistent")?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let method = TradingMethod::with_backends(
        RsiReversion::default(),
        Arc::new(config),
        registry,
        default_backends(),
        events_tx,
    )
    .context("initialising demo strategy")?;
    let instance = method.id();

    // Protocol lines are written from a blocking thread; stdout is sync.
    let writer = tokio::task::spawn_blocking(move || {
        let mut emitter = WorkerEmitter::new(std::io::stdout());
        let mut advice = 0u64;
        while let Some(event) = events_rx.blocking_recv() {
            if matches!(event, PipelineEvent::Advice(_)) {
                advice += 1;
            }
            emitter.event(event)?;
        }
        Ok::<_, trading_advisor::PipelineError>((emitter, advice))
    });

    let (candles_tx, candles_rx) = mpsc::channel::<Candle>(CANDLE_QUEUE);
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut line_no = 0u64;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Candle>(&line) {
                Ok(candle) if candle.is_consistent() => {
                    if candles_tx.send(candle).await.is_err() {
                        break;
                    }
                }
                Ok(candle) => warn!(line_no, start = candle.start, "inconsistent candle skipped"),
                Err(e) => warn!(line_no, error = %e, "unparseable candle skipped"),
            }
        }
        Ok::<_, std::io::Error>(line_no)
    });

    let strategy = method.run(candles_rx).await.context("strategy run failed")?;
    let lines_read = reader.await.context("stdin reader panicked")??;
    let (mut emitter, advice) = writer.await.context("event writer panicked")??;

    let report = json!({
        "instance": instance,
        "linesRead": lines_read,
        "candles": strategy.candles,
        "advice": advice,
        "startPrice": strategy.first_close,
        "endPrice": strategy.last_close,
    });
    emitter.message(WorkerMessage::Report { report })?;

    info!(candles = strategy.candles, advice, "advisor worker done");
    Ok(())
}
