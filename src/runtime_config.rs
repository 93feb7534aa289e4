// =============================================================================
// Advisor Configuration — JSON settings with atomic save
// =============================================================================
//
// Everything a strategy instance needs to know about its environment: replay
// or live mode, the strategy candle size, the live session start, and the
// buffer sizes of the candle pipeline.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::market_data::TWO_WEEKS_OF_MINUTES;
use crate::props_cache::DEFAULT_CACHE_SIZE;
use crate::types::Mode;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_candle_size() -> u32 {
    1
}

fn default_props_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_dynamic_history_size() -> usize {
    TWO_WEEKS_OF_MINUTES
}

fn default_indicator_timeout_ms() -> u64 {
    30_000
}

// =============================================================================
// AdvisorConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Replay history or follow a live market.
    #[serde(default)]
    pub mode: Mode,

    /// Minutes per strategy candle. Used by the live premature-candle guard.
    #[serde(default = "default_candle_size")]
    pub candle_size: u32,

    /// Official start of a live session. Candles starting more than one
    /// candle before this are processed but never checked.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    /// Values retained per series in each candle properties cache.
    #[serde(default = "default_props_cache_size")]
    pub props_cache_size: usize,

    /// Small candles retained by dynamic batchers.
    #[serde(default = "default_dynamic_history_size")]
    pub dynamic_history_size: usize,

    /// Upper bound for a single backend computation. 0 disables the bound.
    #[serde(default = "default_indicator_timeout_ms")]
    pub indicator_timeout_ms: u64,

    /// Log every checked candle.
    #[serde(default)]
    pub debug: bool,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Backtest,
            candle_size: default_candle_size(),
            start_time: None,
            props_cache_size: default_props_cache_size(),
            dynamic_history_size: default_dynamic_history_size(),
            indicator_timeout_ms: default_indicator_timeout_ms(),
            debug: false,
        }
    }
}

impl AdvisorConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error here; see [`AdvisorConfig::load_or_default`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read advisor config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse advisor config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("invalid advisor config in {}", path.display()))?;

        info!(
            path = %path.display(),
            mode = %config.mode,
            candle_size = config.candle_size,
            "advisor config loaded"
        );

        Ok(config)
    }

    /// Like [`AdvisorConfig::load`], but a file that does not exist yields
    /// the defaults with a warning. A file that exists and fails to parse or
    /// validate is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "advisor config not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Persist the configuration to `path` using an atomic write (write to
    /// `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise advisor config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "advisor config saved (atomic)");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.candle_size > 0, "candle_size must be positive");
        ensure!(self.props_cache_size > 0, "props_cache_size must be positive");
        ensure!(self.dynamic_history_size > 0, "dynamic_history_size must be positive");
        Ok(())
    }

    /// Candles starting before this epoch-ms instant are premature in live
    /// mode. `None` outside live mode or without a session start.
    pub fn premature_before(&self) -> Option<i64> {
        match (self.mode, self.start_time) {
            (Mode::Realtime, Some(start)) => {
                Some(start.timestamp_millis() - i64::from(self.candle_size) * 60_000)
            }
            _ => None,
        }
    }

    pub fn indicator_timeout(&self) -> Option<std::time::Duration> {
        (self.indicator_timeout_ms > 0)
            .then(|| std::time::Duration::from_millis(self.indicator_timeout_ms))
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = AdvisorConfig::default();
        assert_eq!(cfg.mode, Mode::Backtest);
        assert_eq!(cfg.candle_size, 1);
        assert_eq!(cfg.props_cache_size, 1_000);
        assert_eq!(cfg.dynamic_history_size, 20_160);
        assert_eq!(cfg.indicator_timeout_ms, 30_000);
        assert!(!cfg.debug);
        cfg.validate().unwrap();
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: AdvisorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, AdvisorConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "mode": "realtime", "candle_size": 60, "start_time": "2024-01-01T00:00:00Z" }"#;
        let cfg: AdvisorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.mode, Mode::Realtime);
        assert_eq!(cfg.candle_size, 60);
        assert_eq!(cfg.props_cache_size, 1_000);

        let start = cfg.start_time.unwrap().timestamp_millis();
        assert_eq!(cfg.premature_before(), Some(start - 3_600_000));
    }

    #[test]
    fn backtest_has_no_premature_bound() {
        let cfg = AdvisorConfig {
            start_time: Some(Utc::now()),
            ..AdvisorConfig::default()
        };
        assert!(cfg.premature_before().is_none());
    }

    #[test]
    fn zero_sizes_fail_validation() {
        let cfg = AdvisorConfig {
            props_cache_size: 0,
            ..AdvisorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_timeout_disables_bound() {
        let cfg = AdvisorConfig {
            indicator_timeout_ms: 0,
            ..AdvisorConfig::default()
        };
        assert!(cfg.indicator_timeout().is_none());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("advisor-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("absent.json");
        assert!(AdvisorConfig::load(&path).is_err());
        assert_eq!(AdvisorConfig::load_or_default(&path).unwrap(), AdvisorConfig::default());

        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(AdvisorConfig::load_or_default(&path).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("advisor-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("advisor.json");

        let cfg = AdvisorConfig {
            candle_size: 15,
            debug: true,
            ..AdvisorConfig::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(AdvisorConfig::load(&path).unwrap(), cfg);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
