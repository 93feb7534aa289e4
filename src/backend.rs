// =============================================================================
// Indicator computation backends
// =============================================================================
//
// A backend takes a snapshot of the properties-cache series plus a parameter
// set and produces named output series asynchronously. The pipeline keeps
// the last value of each series as the indicator result. Any error is fatal
// for the strategy instance that dispatched the computation.
//
// `NativeBackend` computes a handful of common indicators with the batch
// functions in `crate::indicators`. Other backends (an external library, a
// remote service) plug in through the same trait.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use futures_util::future::{BoxFuture, FutureExt};
use tracing::trace;

use crate::error::PipelineResult;
use crate::indicators::{
    atr::calculate_atr, bollinger::bollinger_series, ema::calculate_ema, macd::calculate_macd,
    param_f64, param_period, roc::calculate_roc, rsi::calculate_rsi, sma::calculate_sma, Params,
};
use crate::props_cache::CandleProps;

/// Output series name → values, oldest first.
pub type BackendOutput = BTreeMap<String, Vec<f64>>;

/// Backends a strategy can address by name.
pub type BackendMap = BTreeMap<String, Arc<dyn IndicatorBackend>>;

pub trait IndicatorBackend: Send + Sync {
    /// Name strategies use to pick this backend.
    fn name(&self) -> &str;

    fn supports(&self, indicator_type: &str) -> bool;

    /// Check parameters once, when the indicator is added.
    fn validate(&self, _indicator_type: &str, _params: &Params) -> PipelineResult<()> {
        Ok(())
    }

    fn compute(
        &self,
        indicator_type: &str,
        params: &Params,
        props: CandleProps,
    ) -> BoxFuture<'static, anyhow::Result<BackendOutput>>;
}

// ── Native backend ──────────────────────────────────────────────────────────

pub const NATIVE_BACKEND: &str = "native";

const NATIVE_TYPES: &[&str] = &["atr", "bbands", "ema", "macd", "roc", "rsi", "sma"];

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

/// Backend map holding only the native backend.
pub fn default_backends() -> BackendMap {
    let mut backends = BackendMap::new();
    backends.insert(NATIVE_BACKEND.to_string(), Arc::new(NativeBackend));
    backends
}

impl NativeBackend {
    fn run(indicator_type: &str, params: &Params, props: &CandleProps) -> anyhow::Result<BackendOutput> {
        let close = &props.close;
        let mut out = BackendOutput::new();

        match indicator_type {
            "ema" => {
                let period = param_period(params, indicator_type, "period", None)?;
                out.insert("result".into(), calculate_ema(close, period));
            }
            "sma" => {
                let period = param_period(params, indicator_type, "period", None)?;
                out.insert("result".into(), calculate_sma(close, period));
            }
            "rsi" => {
                let period = param_period(params, indicator_type, "period", Some(14))?;
                out.insert("result".into(), calculate_rsi(close, period));
            }
            "roc" => {
                let period = param_period(params, indicator_type, "period", None)?;
                out.insert("result".into(), calculate_roc(close, period));
            }
            "atr" => {
                let period = param_period(params, indicator_type, "period", Some(14))?;
                out.insert(
                    "result".into(),
                    calculate_atr(&props.high, &props.low, close, period),
                );
            }
            "bbands" => {
                let period = param_period(params, indicator_type, "period", Some(20))?;
                let stddev = param_f64(params, indicator_type, "stddev", 2.0)?;
                let bands = bollinger_series(close, period, stddev);
                out.insert("bbandsUpper".into(), bands.iter().map(|b| b.upper).collect());
                out.insert("bbandsMiddle".into(), bands.iter().map(|b| b.middle).collect());
                out.insert("bbandsLower".into(), bands.iter().map(|b| b.lower).collect());
            }
            "macd" => {
                let fast = param_period(params, indicator_type, "fast", Some(12))?;
                let slow = param_period(params, indicator_type, "slow", Some(26))?;
                let signal = param_period(params, indicator_type, "signal", Some(9))?;
                let macd = calculate_macd(close, fast, slow, signal);
                out.insert("macd".into(), macd.macd);
                out.insert("macdSignal".into(), macd.signal);
                out.insert("macdHistogram".into(), macd.histogram);
            }
            other => bail!("native backend has no indicator `{other}`"),
        }

        Ok(out)
    }
}

impl IndicatorBackend for NativeBackend {
    fn name(&self) -> &str {
        NATIVE_BACKEND
    }

    fn supports(&self, indicator_type: &str) -> bool {
        NATIVE_TYPES.contains(&indicator_type)
    }

    fn validate(&self, indicator_type: &str, params: &Params) -> PipelineResult<()> {
        // Running on an empty snapshot exercises every parameter read.
        Self::run(indicator_type, params, &CandleProps::default())
            .map(|_| ())
            .map_err(|e| match e.downcast::<crate::error::PipelineError>() {
                Ok(pipeline) => pipeline,
                Err(other) => crate::error::PipelineError::UnknownIndicator {
                    indicator_type: format!("{indicator_type} ({other})"),
                },
            })
    }

    fn compute(
        &self,
        indicator_type: &str,
        params: &Params,
        props: CandleProps,
    ) -> BoxFuture<'static, anyhow::Result<BackendOutput>> {
        let indicator_type = indicator_type.to_string();
        let params = params.clone();
        async move {
            trace!(indicator = %indicator_type, len = props.len(), "native compute");
            Self::run(&indicator_type, &params, &props)
                .with_context(|| format!("computing native `{indicator_type}`"))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(closes: &[f64]) -> CandleProps {
        CandleProps {
            open: closes.to_vec(),
            high: closes.iter().map(|c| c + 1.0).collect(),
            low: closes.iter().map(|c| c - 1.0).collect(),
            close: closes.to_vec(),
            volume: vec![1.0; closes.len()],
            vwp: closes.to_vec(),
            trades: vec![1.0; closes.len()],
        }
    }

    fn params(v: serde_json::Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn ema_matches_batch_function() {
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let out = NativeBackend
            .compute("ema", &params(json!({ "period": 5 })), props(&closes))
            .await
            .unwrap();
        assert_eq!(out["result"], calculate_ema(&closes, 5));
    }

    #[tokio::test]
    async fn bbands_outputs_three_series() {
        let closes: Vec<f64> = (0..30).map(|x| 100.0 + (x as f64).sin()).collect();
        let out = NativeBackend
            .compute("bbands", &Params::new(), props(&closes))
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out["bbandsMiddle"].len(), 11);
    }

    #[tokio::test]
    async fn unknown_type_fails() {
        let err = NativeBackend
            .compute("ichimoku", &Params::new(), props(&[1.0]))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("ichimoku"));
    }

    #[test]
    fn validate_catches_bad_params() {
        assert!(NativeBackend.validate("ema", &params(json!({ "period": 9 }))).is_ok());
        let err = NativeBackend.validate("ema", &Params::new()).unwrap_err();
        assert!(err.is_configuration());
        assert!(NativeBackend.supports("macd"));
        assert!(!NativeBackend.supports("EMA"));
    }
}
