// =============================================================================
// Method Context — what strategy hooks see and mutate
// =============================================================================
//
// Owns every indicator, properties cache and batcher of one strategy
// instance. Indicators can only be registered while the instance is being
// initialised; batchers are memoized by configuration and may be requested
// at any time.
//
// In-process indicators are fed from their properties cache as soon as a
// candle is admitted. Asynchronous indicator results, freshness stamps and
// per-tick batcher outputs are installed when the tick they belong to is
// reconciled, so hooks always observe the state of the candle they are
// handed.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::events::{AdviceEvent, IndicatorResultEvent, PipelineEvent};
use crate::backend::{BackendMap, IndicatorBackend};
use crate::batching::{
    BatcherEvent, BatcherKey, CandleBatcher, CandleDynamicBatcher, RollingCandleBatcher,
};
use crate::chart::ChartSpec;
use crate::error::{PipelineError, PipelineResult};
use crate::indicators::{Indicator, IndicatorInput, IndicatorRegistry, IndicatorValue, Params, Sample};
use crate::market_data::Candle;
use crate::props_cache::{CacheKey, CandleProps, CandlePropsCache};
use crate::runtime_config::AdvisorConfig;
use crate::types::{PriceValue, Recommendation};

// ── Registration options ────────────────────────────────────────────────────

/// Window, refresh frequency and chart of an indicator.
#[derive(Debug, Clone)]
pub struct IndicatorOptions {
    pub window: usize,
    pub frequency: usize,
    pub chart: ChartSpec,
}

impl Default for IndicatorOptions {
    fn default() -> Self {
        Self {
            window: 1,
            frequency: 1,
            chart: ChartSpec::default(),
        }
    }
}

impl IndicatorOptions {
    pub fn window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn frequency(mut self, frequency: usize) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn chart(mut self, chart: ChartSpec) -> Self {
        self.chart = chart;
        self
    }
}

// ── Indicator slots ─────────────────────────────────────────────────────────

#[derive(Debug)]
struct Descriptor {
    indicator_type: String,
    cache_key: CacheKey,
    chart: ChartSpec,
    last_update: Option<i64>,
}

#[derive(Debug)]
struct InProcessIndicator {
    desc: Descriptor,
    indicator: Box<dyn Indicator>,
}

struct AsyncIndicator {
    desc: Descriptor,
    backend: Arc<dyn IndicatorBackend>,
    kind: String,
    params: Params,
    result: IndicatorValue,
}

/// One computation to start for an admitted tick.
pub(crate) struct Dispatch {
    pub name: String,
    pub backend: Arc<dyn IndicatorBackend>,
    pub kind: String,
    pub params: Params,
    pub props: CandleProps,
}

/// Per-tick state captured at admission and installed at reconciliation.
#[derive(Debug, Default)]
pub(crate) struct TickInputs {
    /// Async indicator name → sync key of the cache update on this tick.
    pub fresh: BTreeMap<String, i64>,
    pub batched: BTreeMap<BatcherKey, Vec<BatcherEvent>>,
}

#[derive(Debug, Clone)]
enum Batcher {
    Fixed(CandleBatcher),
    Rolling(RollingCandleBatcher),
    Dynamic(CandleDynamicBatcher),
}

// ── Context ─────────────────────────────────────────────────────────────────

pub struct MethodContext {
    instance: Uuid,
    config: Arc<AdvisorConfig>,
    registry: IndicatorRegistry,
    backends: BackendMap,

    setup_open: bool,
    required_history: u64,
    price_value: PriceValue,

    age: u64,
    candle: Option<Candle>,

    indicators: BTreeMap<String, InProcessIndicator>,
    async_indicators: BTreeMap<String, AsyncIndicator>,
    caches: BTreeMap<CacheKey, CandlePropsCache>,
    batchers: BTreeMap<BatcherKey, Batcher>,
    batched: BTreeMap<BatcherKey, Vec<BatcherEvent>>,

    prev_advice: Option<Recommendation>,
    outbox: Vec<PipelineEvent>,
}

impl MethodContext {
    pub(crate) fn new(
        instance: Uuid,
        config: Arc<AdvisorConfig>,
        registry: IndicatorRegistry,
        backends: BackendMap,
    ) -> Self {
        Self {
            instance,
            config,
            registry,
            backends,
            setup_open: true,
            required_history: 0,
            price_value: PriceValue::default(),
            age: 0,
            candle: None,
            indicators: BTreeMap::new(),
            async_indicators: BTreeMap::new(),
            caches: BTreeMap::new(),
            batchers: BTreeMap::new(),
            batched: BTreeMap::new(),
            prev_advice: None,
            outbox: Vec::new(),
        }
    }

    // ── Plain accessors ─────────────────────────────────────────────────

    pub fn instance(&self) -> Uuid {
        self.instance
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Age of the tick being processed: 1 for the first small candle.
    pub fn age(&self) -> u64 {
        self.age
    }

    /// The small candle being processed.
    pub fn candle(&self) -> Option<&Candle> {
        self.candle.as_ref()
    }

    pub fn required_history(&self) -> u64 {
        self.required_history
    }

    /// Small candles to see before `check` is called.
    pub fn set_required_history(&mut self, candles: u64) {
        self.required_history = candles;
    }

    pub fn price_value(&self) -> PriceValue {
        self.price_value
    }

    /// Candle field fed to price-input in-process indicators.
    pub fn set_price_value(&mut self, price_value: PriceValue) {
        self.price_value = price_value;
    }

    pub fn has_sync_indicators(&self) -> bool {
        !self.indicators.is_empty()
    }

    pub fn has_async_indicators(&self) -> bool {
        !self.async_indicators.is_empty()
    }

    pub fn previous_advice(&self) -> Option<Recommendation> {
        self.prev_advice
    }

    // ── Indicator registration ──────────────────────────────────────────

    /// Register an in-process indicator from the registry.
    pub fn add_indicator(
        &mut self,
        name: &str,
        indicator_type: &str,
        params: Params,
        options: IndicatorOptions,
    ) -> PipelineResult<()> {
        self.check_registration(name, &options)?;
        let indicator = self.registry.create(indicator_type, &params)?;

        let cache_key = self.ensure_cache(&options)?;
        self.indicators.insert(
            name.to_string(),
            InProcessIndicator {
                desc: Descriptor {
                    indicator_type: indicator_type.to_string(),
                    cache_key,
                    chart: options.chart,
                    last_update: None,
                },
                indicator,
            },
        );
        debug!(name, indicator_type, cache = %cache_key, "in-process indicator added");
        Ok(())
    }

    /// Register an indicator computed by a named backend.
    pub fn add_async_indicator(
        &mut self,
        name: &str,
        backend: &str,
        indicator_type: &str,
        params: Params,
        options: IndicatorOptions,
    ) -> PipelineResult<()> {
        self.check_registration(name, &options)?;

        let backend_impl = self
            .backends
            .get(backend)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownBackend {
                backend: backend.to_string(),
            })?;
        if !backend_impl.supports(indicator_type) {
            return Err(PipelineError::UnknownIndicator {
                indicator_type: format!("{backend}-{indicator_type}"),
            });
        }
        backend_impl.validate(indicator_type, &params)?;

        let cache_key = self.ensure_cache(&options)?;
        self.async_indicators.insert(
            name.to_string(),
            AsyncIndicator {
                desc: Descriptor {
                    indicator_type: format!("{backend}-{indicator_type}"),
                    cache_key,
                    chart: options.chart,
                    last_update: None,
                },
                backend: backend_impl,
                kind: indicator_type.to_string(),
                params,
                result: IndicatorValue::Empty,
            },
        );
        debug!(name, backend, indicator_type, cache = %cache_key, "async indicator added");
        Ok(())
    }

    fn check_registration(&self, name: &str, options: &IndicatorOptions) -> PipelineResult<()> {
        if !self.setup_open {
            return Err(PipelineError::SetupClosed {
                name: name.to_string(),
            });
        }
        if self.indicators.contains_key(name) || self.async_indicators.contains_key(name) {
            return Err(PipelineError::DuplicateIndicator {
                name: name.to_string(),
            });
        }
        if options.window == 0 {
            return Err(PipelineError::invalid("window", "must be at least one candle"));
        }
        Ok(())
    }

    fn ensure_cache(&mut self, options: &IndicatorOptions) -> PipelineResult<CacheKey> {
        let key = CacheKey::new(options.window, options.frequency);
        if !self.caches.contains_key(&key) {
            let cache = CandlePropsCache::new(key.window, key.frequency, self.config.props_cache_size)?;
            self.caches.insert(key, cache);
        }
        Ok(key)
    }

    /// Latest result of an indicator of either kind.
    pub fn indicator(&self, name: &str) -> Option<IndicatorValue> {
        if let Some(slot) = self.indicators.get(name) {
            return Some(slot.indicator.result());
        }
        self.async_indicators.get(name).map(|slot| slot.result.clone())
    }

    /// Shorthand for the scalar value of an indicator.
    pub fn indicator_value(&self, name: &str) -> Option<f64> {
        self.indicator(name).and_then(|v| v.as_scalar())
    }

    // ── Batchers ────────────────────────────────────────────────────────

    /// Memoized fixed batcher; its output for the current tick is read with
    /// [`batched`](Self::batched).
    pub fn get_fixed_candle_batcher(&mut self, size: usize) -> PipelineResult<BatcherKey> {
        let key = BatcherKey::Fixed { size };
        if !self.batchers.contains_key(&key) {
            self.batchers.insert(key, Batcher::Fixed(CandleBatcher::new(size)?));
        }
        Ok(key)
    }

    pub fn get_rolling_candle_batcher(
        &mut self,
        history: usize,
        frequency: usize,
        allow_partial_first: bool,
    ) -> PipelineResult<BatcherKey> {
        let key = BatcherKey::Rolling {
            history,
            frequency,
            allow_partial_first,
        };
        if !self.batchers.contains_key(&key) {
            let batcher = RollingCandleBatcher::new(history, frequency, allow_partial_first)?;
            self.batchers.insert(key, Batcher::Rolling(batcher));
        }
        Ok(key)
    }

    pub fn get_dynamic_candle_batcher(
        &mut self,
        size: usize,
        required_history: usize,
    ) -> PipelineResult<BatcherKey> {
        let key = BatcherKey::Dynamic {
            size,
            required_history,
        };
        if !self.batchers.contains_key(&key) {
            let batcher =
                CandleDynamicBatcher::new(size, required_history, self.config.dynamic_history_size)?;
            self.batchers.insert(key, Batcher::Dynamic(batcher));
        }
        Ok(key)
    }

    /// Change the aggregation size of a dynamic batcher. The key keeps
    /// identifying the batcher.
    pub fn set_dynamic_candle_size(&mut self, key: BatcherKey, size: usize) -> PipelineResult<()> {
        match self.batchers.get_mut(&key) {
            Some(Batcher::Dynamic(batcher)) => batcher.set_candle_size(size),
            _ => Err(PipelineError::invalid(
                "batcher",
                format!("{key} is not a dynamic batcher of this strategy"),
            )),
        }
    }

    /// Everything the batcher produced while the current tick was admitted.
    pub fn batched(&self, key: BatcherKey) -> &[BatcherEvent] {
        self.batched.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Candles the batcher produced on the current tick, ignoring resets.
    pub fn batched_candles(&self, key: BatcherKey) -> impl Iterator<Item = &Candle> + '_ {
        self.batched(key).iter().filter_map(|event| match event {
            BatcherEvent::Candle(c) => Some(c),
            BatcherEvent::Reset => None,
        })
    }

    // ── Output ──────────────────────────────────────────────────────────

    /// Recommend a position. Absent or repeated recommendations are ignored.
    /// Returns whether an advice event was queued.
    pub fn advice(&mut self, recommendation: Option<Recommendation>, candle: Option<&Candle>) -> bool {
        let Some(recommendation) = recommendation else {
            return false;
        };
        if self.prev_advice == Some(recommendation) {
            return false;
        }

        self.prev_advice = Some(recommendation);
        let candle = candle.or(self.candle.as_ref()).cloned();
        debug!(%recommendation, candle = ?candle.as_ref().map(|c| c.start), "advice");
        self.outbox.push(PipelineEvent::Advice(AdviceEvent {
            recommendation,
            portfolio: 1,
            candle,
        }));
        true
    }

    /// Send custom chart data alongside the indicator results.
    pub fn emit_indicator_data(&mut self, event: IndicatorResultEvent) {
        self.outbox.push(PipelineEvent::IndicatorResult(event));
    }

    // ── Pipeline internals ──────────────────────────────────────────────

    pub(crate) fn close_setup(&mut self) {
        self.setup_open = false;
    }

    pub(crate) fn queue(&mut self, event: PipelineEvent) {
        self.outbox.push(event);
    }

    pub(crate) fn take_outbox(&mut self) -> Vec<PipelineEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Feed an admitted small candle to every cache and batcher.
    ///
    /// In-process indicators are updated straight away. What the hooks will
    /// need later (fresh async indicators, batcher output) is returned.
    pub(crate) fn feed(&mut self, candle: &Candle) -> TickInputs {
        let mut inputs = TickInputs::default();
        let small = std::slice::from_ref(candle);

        let mut accepted: BTreeMap<CacheKey, Vec<Candle>> = BTreeMap::new();
        for (key, cache) in self.caches.iter_mut() {
            let out = cache.write(small);
            if !out.is_empty() {
                accepted.insert(*key, out);
            }
        }

        let price_value = self.price_value;
        for slot in self.indicators.values_mut() {
            let Some(candles) = accepted.get(&slot.desc.cache_key) else {
                continue;
            };
            for c in candles {
                let sample = match slot.indicator.input() {
                    IndicatorInput::Price => Sample::Price(c.price(price_value)),
                    IndicatorInput::Candle => Sample::Candle(c),
                };
                slot.indicator.update(sample);
            }
            slot.desc.last_update = candles.last().map(Candle::sync_key);
        }

        for (name, slot) in &self.async_indicators {
            if let Some(last) = accepted.get(&slot.desc.cache_key).and_then(|c| c.last()) {
                inputs.fresh.insert(name.clone(), last.sync_key());
            }
        }

        for (key, batcher) in self.batchers.iter_mut() {
            let events: Vec<BatcherEvent> = match batcher {
                Batcher::Fixed(b) => b.write(small).into_iter().map(BatcherEvent::Candle).collect(),
                Batcher::Rolling(b) => b.write(small).into_iter().map(BatcherEvent::Candle).collect(),
                Batcher::Dynamic(b) => b.write(small),
            };
            if events.is_empty() {
                continue;
            }
            self.outbox.extend(events.iter().map(|event| match event {
                BatcherEvent::Reset => PipelineEvent::Reset { batcher: *key },
                BatcherEvent::Candle(candle) => PipelineEvent::Batched {
                    batcher: *key,
                    candle: candle.clone(),
                },
            }));
            inputs.batched.insert(*key, events);
        }

        inputs
    }

    /// One computation per async indicator, each with a snapshot of its cache.
    pub(crate) fn dispatches(&self) -> Vec<Dispatch> {
        self.async_indicators
            .iter()
            .map(|(name, slot)| Dispatch {
                name: name.clone(),
                backend: Arc::clone(&slot.backend),
                kind: slot.kind.clone(),
                params: slot.params.clone(),
                props: self
                    .caches
                    .get(&slot.desc.cache_key)
                    .map(CandlePropsCache::snapshot)
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Make the tick being reconciled current.
    pub(crate) fn install(
        &mut self,
        age: u64,
        candle: &Candle,
        inputs: TickInputs,
        results: BTreeMap<String, IndicatorValue>,
    ) {
        self.age = age;
        self.candle = Some(candle.clone());
        self.batched = inputs.batched;

        for (name, result) in results {
            match self.async_indicators.get_mut(&name) {
                Some(slot) => slot.result = result,
                None => warn!(name = %name, "result for unknown async indicator dropped"),
            }
        }
        for (name, stamp) in inputs.fresh {
            if let Some(slot) = self.async_indicators.get_mut(&name) {
                slot.desc.last_update = Some(stamp);
            }
        }
    }

    /// Queue chart results for indicators updated on exactly this candle.
    pub(crate) fn emit_indicator_results(&mut self, candle: &Candle) {
        let fresh = |desc: &Descriptor| !desc.chart.is_empty() && desc.last_update == Some(candle.start);

        let mut events = Vec::new();
        for (name, slot) in &self.indicators {
            if fresh(&slot.desc) {
                events.push(result_event(name, &slot.desc, candle, &slot.indicator.result()));
            }
        }
        for (name, slot) in &self.async_indicators {
            if fresh(&slot.desc) {
                events.push(result_event(name, &slot.desc, candle, &slot.result));
            }
        }
        self.outbox.extend(events.into_iter().map(PipelineEvent::IndicatorResult));
    }
}

fn result_event(name: &str, desc: &Descriptor, candle: &Candle, value: &IndicatorValue) -> IndicatorResultEvent {
    IndicatorResultEvent {
        name: name.to_string(),
        date: candle.start,
        result: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        indicator_type: Some(desc.indicator_type.clone()),
        chart: desc.chart.clone(),
    }
}
