// =============================================================================
// Trading Method — per-instance tick orchestrator
// =============================================================================
//
// Drives one strategy instance: admits small candles, feeds caches and
// batchers, dispatches asynchronous indicator computations, and reconciles
// each tick exactly once, in arrival order, after every computation of that
// tick has reported back.
//
// Ordering rules:
//   - Ticks are reconciled strictly front-to-back. A tick whose latch opened
//     early waits for every older tick.
//   - With both in-process and asynchronous indicators, a candle arriving
//     while the pipeline is not caught up is deferred. In-process indicator
//     state is advanced at admission, so admitting it early would let that
//     state run ahead of the tick still waiting for a backend.
//   - Deferred candles are admitted FIFO as soon as the pipeline catches up.
//
// Events produced while a tick runs are queued on the context and flushed to
// the observer channel when the synchronous work of the call is done.
// =============================================================================

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn, Span};
use uuid::Uuid;

use super::context::{MethodContext, TickInputs};
use super::events::{EventSender, PipelineEvent};
use super::latch::TickLatch;
use super::status::{Phase, StatusHandle};
use super::strategy::Strategy;
use crate::backend::{default_backends, BackendMap, BackendOutput};
use crate::error::{PipelineError, PipelineResult};
use crate::indicators::{IndicatorRegistry, IndicatorValue};
use crate::market_data::Candle;
use crate::runtime_config::AdvisorConfig;

type FinishCallback = Box<dyn FnOnce() + Send>;

/// One asynchronous computation reporting back.
#[derive(Debug)]
struct Completion {
    seq: u64,
    name: String,
    outcome: PipelineResult<BackendOutput>,
}

/// An admitted tick waiting for its computations.
#[derive(Debug)]
struct InFlightTick {
    seq: u64,
    candle: Candle,
    latch: TickLatch,
    results: BTreeMap<String, IndicatorValue>,
    inputs: TickInputs,
}

pub struct TradingMethod<S: Strategy> {
    id: Uuid,
    span: Span,
    strategy: S,
    ctx: MethodContext,
    phase: Phase,

    age: u64,
    processed: u64,
    deferred: VecDeque<Candle>,
    in_flight: VecDeque<InFlightTick>,

    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    timeout: Option<Duration>,

    finish_cb: Option<FinishCallback>,
    status: StatusHandle,
    events: EventSender,
}

impl<S: Strategy> TradingMethod<S> {
    /// Build an instance with the built-in indicators and the native backend.
    pub fn new(strategy: S, config: Arc<AdvisorConfig>, events: EventSender) -> PipelineResult<Self> {
        Self::with_backends(strategy, config, IndicatorRegistry::builtin(), default_backends(), events)
    }

    /// Build an instance and run the strategy's `init` hook. Indicators can
    /// no longer be added once this returns.
    pub fn with_backends(
        strategy: S,
        config: Arc<AdvisorConfig>,
        registry: IndicatorRegistry,
        backends: BackendMap,
        events: EventSender,
    ) -> PipelineResult<Self> {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("trading_method", instance = %id);
        let timeout = config.indicator_timeout();
        let ctx = MethodContext::new(id, config, registry, backends);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let mut method = Self {
            id,
            span,
            strategy,
            ctx,
            phase: Phase::Initializing,
            age: 0,
            processed: 0,
            deferred: VecDeque::new(),
            in_flight: VecDeque::new(),
            completions_tx,
            completions_rx,
            timeout,
            finish_cb: None,
            status: StatusHandle::new(id),
            events,
        };

        let span = method.span.clone();
        let _enter = span.enter();

        method
            .strategy
            .init(&mut method.ctx)
            .map_err(PipelineError::Strategy)?;
        method.ctx.close_setup();
        method.phase = Phase::Ready;

        info!(
            in_process = method.ctx.has_sync_indicators(),
            asynchronous = method.ctx.has_async_indicators(),
            required_history = method.ctx.required_history(),
            "strategy initialised"
        );
        method.flush();
        method.publish();
        Ok(method)
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn context(&self) -> &MethodContext {
        &self.ctx
    }

    /// Every admitted candle has been through its decision step.
    pub fn caught_up(&self) -> bool {
        self.age == self.processed
    }

    fn accepting(&self) -> PipelineResult<()> {
        match self.phase {
            Phase::Initializing | Phase::Ready => Ok(()),
            Phase::Finishing | Phase::Finished | Phase::Failed => Err(PipelineError::Finished),
        }
    }

    // ── Tick protocol ───────────────────────────────────────────────────

    /// Hand the next small candle to the pipeline. Asynchronous indicator
    /// computations are spawned on the current tokio runtime.
    pub fn tick(&mut self, candle: Candle) -> PipelineResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();
        self.accepting()?;

        let must_wait =
            self.ctx.has_async_indicators() && self.ctx.has_sync_indicators() && !self.caught_up();
        if must_wait {
            debug!(start = candle.start, queued = self.deferred.len() + 1, "candle deferred");
            self.deferred.push_back(candle);
            self.publish();
            return Ok(());
        }

        self.admit(candle);
        let result = self.drain();
        self.flush();
        self.publish();
        result
    }

    /// Forward a trade to the strategy.
    pub fn process_trade(&mut self, trade: &Value) -> PipelineResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();
        self.accepting()?;

        let result = self.hook(|strategy, ctx| strategy.on_trade(ctx, trade));
        self.flush();
        result
    }

    /// Stop accepting candles. `done` runs after the strategy's `end` hook,
    /// immediately when nothing is pending, otherwise once the last admitted
    /// tick has been reconciled.
    pub fn finish(&mut self, done: impl FnOnce() + Send + 'static) -> PipelineResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();
        self.accepting()?;

        self.finish_cb = Some(Box::new(done));
        self.phase = Phase::Finishing;

        let result = if !self.ctx.has_async_indicators() || self.caught_up() {
            self.complete_finish()
        } else {
            info!(
                age = self.age,
                processed = self.processed,
                deferred = self.deferred.len(),
                "finish requested, waiting for pending ticks"
            );
            Ok(())
        };
        self.publish();
        result
    }

    /// Wait until every admitted and deferred candle has been reconciled.
    pub async fn settle(&mut self) -> PipelineResult<()> {
        while !self.in_flight.is_empty() {
            let Some(completion) = self.completions_rx.recv().await else {
                break;
            };
            self.on_completion(completion)?;
        }
        Ok(())
    }

    /// Drive the instance from a candle channel. Closing the channel finishes
    /// the instance; the strategy is handed back once it has ended.
    pub async fn run(mut self, mut candles: mpsc::Receiver<Candle>) -> PipelineResult<S> {
        let mut input_open = true;

        while self.phase != Phase::Finished {
            tokio::select! {
                Some(completion) = self.completions_rx.recv(), if !self.in_flight.is_empty() => {
                    self.on_completion(completion)?;
                }
                next = candles.recv(), if input_open => match next {
                    Some(candle) => self.tick(candle)?,
                    None => {
                        input_open = false;
                        self.finish(|| {})?;
                    }
                },
                else => break,
            }
        }

        Ok(self.strategy)
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Steps 2 and 3: count the candle, feed it, dispatch its computations.
    fn admit(&mut self, candle: Candle) {
        self.age += 1;
        let seq = self.age;

        self.ctx.queue(PipelineEvent::Candle {
            candle: candle.clone(),
        });
        let inputs = self.ctx.feed(&candle);

        let dispatches = self.ctx.dispatches();
        trace!(seq, start = candle.start, computations = dispatches.len(), "candle admitted");

        let latch = TickLatch::new(dispatches.len());
        for dispatch in dispatches {
            let tx = self.completions_tx.clone();
            let timeout = self.timeout;
            let backend = dispatch.backend.name().to_string();
            let name = dispatch.name;
            let future = dispatch
                .backend
                .compute(&dispatch.kind, &dispatch.params, dispatch.props);

            tokio::spawn(async move {
                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, future).await {
                        Ok(result) => result,
                        Err(_) => {
                            let _ = tx.send(Completion {
                                seq,
                                outcome: Err(PipelineError::BackendTimeout {
                                    backend,
                                    indicator: name.clone(),
                                    timeout_ms: limit.as_millis() as u64,
                                }),
                                name,
                            });
                            return;
                        }
                    },
                    None => future.await,
                };
                let outcome = outcome.map_err(|e| PipelineError::Backend {
                    backend,
                    indicator: name.clone(),
                    reason: format!("{e:#}"),
                });
                // The receiver is gone only when the instance was dropped.
                let _ = tx.send(Completion { seq, name, outcome });
            });
        }

        self.in_flight.push_back(InFlightTick {
            seq,
            candle,
            latch,
            results: BTreeMap::new(),
            inputs,
        });
    }

    fn on_completion(&mut self, completion: Completion) -> PipelineResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();

        let Completion { seq, name, outcome } = completion;
        let output = match outcome {
            Ok(output) => output,
            Err(e) => return Err(self.fail(e)),
        };

        let Some(tick) = self.in_flight.iter_mut().find(|t| t.seq == seq) else {
            warn!(seq, indicator = %name, "completion for unknown tick dropped");
            return Ok(());
        };
        trace!(seq, indicator = %name, remaining = tick.latch.remaining(), "computation returned");
        tick.results.insert(name, IndicatorValue::from_series_last(&output));
        tick.latch.count_down();

        let result = self.drain();
        self.flush();
        self.publish();
        result
    }

    /// Reconcile every tick at the front whose latch is open, then admit the
    /// next deferred candle once caught up. Repeats until blocked.
    fn drain(&mut self) -> PipelineResult<()> {
        loop {
            while self.in_flight.front().is_some_and(|t| t.latch.is_open()) {
                if let Some(tick) = self.in_flight.pop_front() {
                    self.reconcile(tick)?;
                }
            }
            if !self.in_flight.is_empty() {
                break;
            }
            match self.deferred.pop_front() {
                Some(candle) => {
                    debug!(start = candle.start, left = self.deferred.len(), "deferred candle admitted");
                    self.admit(candle);
                }
                None => break,
            }
        }

        if self.phase == Phase::Finishing && self.in_flight.is_empty() && self.deferred.is_empty() {
            self.complete_finish()?;
        }
        Ok(())
    }

    /// Step 4 and the chart emission of step 6.
    fn reconcile(&mut self, tick: InFlightTick) -> PipelineResult<()> {
        let InFlightTick {
            seq,
            candle,
            results,
            inputs,
            ..
        } = tick;

        self.ctx.install(seq, &candle, inputs, results);
        self.hook(|strategy, ctx| strategy.update(ctx, &candle))?;

        let premature = self
            .ctx
            .config()
            .premature_before()
            .is_some_and(|boundary| candle.start < boundary);
        let eligible = seq >= self.ctx.required_history() && !premature;

        if eligible {
            if self.ctx.config().debug {
                debug!(
                    age = seq,
                    candle = %chrono::DateTime::from_timestamp_millis(candle.start)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| candle.start.to_string()),
                    close = candle.close,
                    "checking candle"
                );
            }
            self.hook(|strategy, ctx| strategy.check(ctx, &candle))?;
        } else if premature {
            debug!(age = seq, start = candle.start, "premature candle, check skipped");
        }

        self.processed += 1;
        self.ctx.emit_indicator_results(&candle);
        Ok(())
    }

    fn complete_finish(&mut self) -> PipelineResult<()> {
        self.hook(|strategy, ctx| strategy.end(ctx))?;
        self.flush();

        if let Some(done) = self.finish_cb.take() {
            done();
        }
        self.phase = Phase::Finished;
        info!(age = self.age, processed = self.processed, "strategy finished");
        Ok(())
    }

    /// Run a strategy hook; a failing hook takes the instance down.
    fn hook(
        &mut self,
        call: impl FnOnce(&mut S, &mut MethodContext) -> anyhow::Result<()>,
    ) -> PipelineResult<()> {
        match call(&mut self.strategy, &mut self.ctx) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(PipelineError::Strategy(e))),
        }
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        error!(error = %err, age = self.age, processed = self.processed, "strategy instance failed");
        self.phase = Phase::Failed;
        self.finish_cb = None;
        self.publish();
        err
    }

    /// Deliver queued events to the observer.
    fn flush(&mut self) {
        for event in self.ctx.take_outbox() {
            if self.events.send(event).is_err() {
                trace!("event observer gone");
                break;
            }
        }
    }

    fn publish(&self) {
        let phase = self.phase;
        let (age, processed) = (self.age, self.processed);
        let (deferred, in_flight) = (self.deferred.len(), self.in_flight.len());
        let last_candle = self.ctx.candle().map(|c| c.start);
        self.status.publish(|s| {
            s.phase = phase;
            s.age = age;
            s.processed = processed;
            s.deferred = deferred;
            s.in_flight = in_flight;
            s.last_candle = last_candle;
        });
    }
}
