// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Two flavours live here:
//   - batch functions over slices (`calculate_*`), used by the native
//     computation backend on properties-cache snapshots;
//   - streaming in-process indicators implementing [`Indicator`], updated once
//     per candle by the strategy pipeline.
//
// In-process indicator types are resolved through a statically registered
// name → factory table ([`IndicatorRegistry`]).

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sma;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, PipelineResult};
use crate::market_data::Candle;

pub use ema::Ema;
pub use rsi::Rsi;
pub use sma::Sma;

/// Free-form indicator parameters, as written in strategy settings.
pub type Params = serde_json::Map<String, Value>;

// ── Streaming indicator seam ────────────────────────────────────────────────

/// What an in-process indicator wants to be fed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorInput {
    /// A single price picked by the strategy's price source.
    Price,
    /// The whole candle.
    Candle,
}

/// One update handed to an in-process indicator.
#[derive(Debug, Clone, Copy)]
pub enum Sample<'a> {
    Price(f64),
    Candle(&'a Candle),
}

impl Sample<'_> {
    /// The price for price-input indicators; the close for candle input.
    pub fn price(&self) -> f64 {
        match self {
            Sample::Price(p) => *p,
            Sample::Candle(c) => c.close,
        }
    }

    pub fn candle(&self) -> Option<&Candle> {
        match self {
            Sample::Candle(c) => Some(c),
            Sample::Price(_) => None,
        }
    }
}

/// An indicator computed in-process on every strategy tick.
pub trait Indicator: Send + fmt::Debug {
    fn input(&self) -> IndicatorInput {
        IndicatorInput::Price
    }

    fn update(&mut self, sample: Sample<'_>);

    fn result(&self) -> IndicatorValue;
}

// ── Result values ───────────────────────────────────────────────────────────

/// Latest value of an indicator: nothing yet, a scalar, or named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndicatorValue {
    Scalar(f64),
    Fields(BTreeMap<String, f64>),
    #[default]
    Empty,
}

impl IndicatorValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, IndicatorValue::Empty)
    }

    /// The scalar, or the `result` field of a field set.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            IndicatorValue::Scalar(v) => Some(*v),
            IndicatorValue::Fields(fields) => fields.get("result").copied(),
            IndicatorValue::Empty => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        match self {
            IndicatorValue::Fields(fields) => fields.get(name).copied(),
            _ => None,
        }
    }

    /// Take the last value of every named output series. Series that are
    /// still empty are left out.
    pub fn from_series_last(series: &BTreeMap<String, Vec<f64>>) -> Self {
        let fields: BTreeMap<String, f64> = series
            .iter()
            .filter_map(|(name, values)| values.last().map(|v| (name.clone(), *v)))
            .collect();
        if fields.is_empty() {
            IndicatorValue::Empty
        } else {
            IndicatorValue::Fields(fields)
        }
    }
}

impl From<Option<f64>> for IndicatorValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(IndicatorValue::Empty, IndicatorValue::Scalar)
    }
}

impl fmt::Display for IndicatorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorValue::Scalar(v) => write!(f, "{v:.6}"),
            IndicatorValue::Fields(fields) => {
                let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v:.6}")).collect();
                write!(f, "{}", parts.join(" "))
            }
            IndicatorValue::Empty => write!(f, "-"),
        }
    }
}

// ── Parameter helpers ───────────────────────────────────────────────────────

/// Read a positive integer parameter, falling back to `default` when absent.
pub fn param_period(
    params: &Params,
    indicator_type: &str,
    key: &str,
    default: Option<usize>,
) -> PipelineResult<usize> {
    let invalid = |reason: &str| PipelineError::InvalidParameter {
        indicator_type: indicator_type.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    };

    match params.get(key) {
        None | Some(Value::Null) => default.ok_or_else(|| invalid("required")),
        Some(value) => match value.as_u64() {
            Some(n) if n > 0 => Ok(n as usize),
            _ => Err(invalid("expected a positive integer")),
        },
    }
}

/// Read a numeric parameter, falling back to `default` when absent.
pub fn param_f64(params: &Params, indicator_type: &str, key: &str, default: f64) -> PipelineResult<f64> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| PipelineError::InvalidParameter {
                indicator_type: indicator_type.to_string(),
                key: key.to_string(),
                reason: "expected a finite number".to_string(),
            }),
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

pub type IndicatorFactory = fn(&Params) -> PipelineResult<Box<dyn Indicator>>;

fn build_ema(params: &Params) -> PipelineResult<Box<dyn Indicator>> {
    Ok(Box::new(Ema::from_params(params)?))
}

fn build_sma(params: &Params) -> PipelineResult<Box<dyn Indicator>> {
    Ok(Box::new(Sma::from_params(params)?))
}

fn build_rsi(params: &Params) -> PipelineResult<Box<dyn Indicator>> {
    Ok(Box::new(Rsi::from_params(params)?))
}

const BUILTIN: &[(&str, IndicatorFactory)] = &[
    ("EMA", build_ema),
    ("SMA", build_sma),
    ("RSI", build_rsi),
];

/// Name → factory table for in-process indicators.
#[derive(Clone)]
pub struct IndicatorRegistry {
    factories: BTreeMap<&'static str, IndicatorFactory>,
}

impl fmt::Debug for IndicatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl Default for IndicatorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl IndicatorRegistry {
    /// Registry holding the built-in in-process indicators.
    pub fn builtin() -> Self {
        Self {
            factories: BUILTIN.iter().copied().collect(),
        }
    }

    /// Add a custom in-process indicator type.
    pub fn register(&mut self, name: &'static str, factory: IndicatorFactory) -> PipelineResult<()> {
        if self.factories.contains_key(name) {
            return Err(PipelineError::invalid(
                "indicator_type",
                format!("`{name}` is already registered"),
            ));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Startup check. Every factory must either build from an empty
    /// parameter map or name the parameter it requires, and a freshly built
    /// indicator must not report a value before its first update.
    pub fn validate(&self) -> PipelineResult<()> {
        let mut seen = std::collections::BTreeSet::new();
        for (name, _) in BUILTIN {
            if !seen.insert(*name) {
                return Err(PipelineError::invalid(
                    "indicator_type",
                    format!("`{name}` registered twice"),
                ));
            }
        }
        for (name, factory) in &self.factories {
            if name.trim().is_empty() {
                return Err(PipelineError::invalid(
                    "indicator_type",
                    format!("blank indicator name `{name}`"),
                ));
            }
            match factory(&Params::new()) {
                Ok(indicator) if !indicator.result().is_empty() => {
                    return Err(PipelineError::invalid(
                        "indicator_type",
                        format!("`{name}` reports a value before any update"),
                    ));
                }
                Ok(_) => {}
                Err(PipelineError::InvalidParameter { reason, .. }) if reason == "required" => {}
                Err(e) => {
                    return Err(PipelineError::invalid(
                        "indicator_type",
                        format!("`{name}` cannot be built with defaults: {e}"),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn contains(&self, indicator_type: &str) -> bool {
        self.factories.contains_key(indicator_type)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn create(&self, indicator_type: &str, params: &Params) -> PipelineResult<Box<dyn Indicator>> {
        let factory = self
            .factories
            .get(indicator_type)
            .ok_or_else(|| PipelineError::UnknownIndicator {
                indicator_type: indicator_type.to_string(),
            })?;
        factory(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> Params {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn builtin_registry_is_valid() {
        let registry = IndicatorRegistry::builtin();
        registry.validate().unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["EMA", "RSI", "SMA"]);
    }

    #[derive(Debug)]
    struct Primed;

    impl Indicator for Primed {
        fn update(&mut self, _sample: Sample<'_>) {}

        fn result(&self) -> IndicatorValue {
            IndicatorValue::Scalar(1.0)
        }
    }

    fn build_primed(_params: &Params) -> PipelineResult<Box<dyn Indicator>> {
        Ok(Box::new(Primed))
    }

    fn build_broken(_params: &Params) -> PipelineResult<Box<dyn Indicator>> {
        Err(PipelineError::invalid("window", "expected a positive integer"))
    }

    #[test]
    fn validate_builds_every_factory() {
        let mut registry = IndicatorRegistry::builtin();
        registry.register("PRIMED", build_primed).unwrap();
        let err = registry.validate().unwrap_err();
        assert!(err.to_string().contains("PRIMED"));

        let mut registry = IndicatorRegistry::builtin();
        registry.register("BROKEN", build_broken).unwrap();
        let err = registry.validate().unwrap_err();
        assert!(err.to_string().contains("BROKEN"));

        let mut registry = IndicatorRegistry::builtin();
        registry.register("EMA_FAST", build_ema).unwrap();
        registry.validate().unwrap();
    }

    #[test]
    fn unknown_type_is_configuration_error() {
        let err = IndicatorRegistry::builtin()
            .create("ICHIMOKU", &Params::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownIndicator { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn create_and_update() {
        let registry = IndicatorRegistry::builtin();
        let mut sma = registry.create("SMA", &params(json!({ "window": 2 }))).unwrap();
        sma.update(Sample::Price(1.0));
        sma.update(Sample::Price(3.0));
        assert_eq!(sma.result(), IndicatorValue::Scalar(2.0));
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = IndicatorRegistry::builtin();
        assert!(registry.register("EMA", build_ema).is_err());
        registry.register("EMA_FAST", build_ema).unwrap();
        assert!(registry.contains("EMA_FAST"));
    }

    #[test]
    fn period_parameter_rules() {
        let p = params(json!({ "a": 5, "b": -1, "c": "x" }));
        assert_eq!(param_period(&p, "T", "a", None).unwrap(), 5);
        assert!(param_period(&p, "T", "b", None).is_err());
        assert!(param_period(&p, "T", "c", Some(3)).is_err());
        assert_eq!(param_period(&p, "T", "missing", Some(3)).unwrap(), 3);
        assert!(param_period(&p, "T", "missing", None).is_err());
    }

    #[test]
    fn value_json_shapes() {
        assert_eq!(serde_json::to_value(IndicatorValue::Scalar(1.5)).unwrap(), json!(1.5));
        assert_eq!(serde_json::to_value(IndicatorValue::Empty).unwrap(), Value::Null);

        let mut series = BTreeMap::new();
        series.insert("result".to_string(), vec![1.0, 2.0]);
        series.insert("pending".to_string(), vec![]);
        let value = IndicatorValue::from_series_last(&series);
        assert_eq!(value.as_scalar(), Some(2.0));
        assert_eq!(serde_json::to_value(&value).unwrap(), json!({ "result": 2.0 }));
    }
}
