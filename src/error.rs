// =============================================================================
// Pipeline Errors
// =============================================================================
//
// Three families:
//   - configuration: bad constructor arguments, indicators requested after
//     setup, unknown indicator types or backends. Raised at the call site.
//   - backend: an external indicator computation failed or timed out. Fatal
//     for the owning strategy instance, never retried.
//   - process death: a worker exited with a non-zero status. Its partial
//     results are discarded.
// =============================================================================

/// Convenience alias used throughout the pipeline.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    // ── Configuration ───────────────────────────────────────────────────
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("indicator `{name}` can only be added while the strategy is initialising")]
    SetupClosed { name: String },

    #[error("unknown indicator type `{indicator_type}`")]
    UnknownIndicator { indicator_type: String },

    #[error("unknown indicator backend `{backend}`")]
    UnknownBackend { backend: String },

    #[error("indicator `{name}` is already registered")]
    DuplicateIndicator { name: String },

    #[error("invalid parameter `{key}` for {indicator_type}: {reason}")]
    InvalidParameter {
        indicator_type: String,
        key: String,
        reason: String,
    },

    // ── Backend ─────────────────────────────────────────────────────────
    #[error("{backend} error while computing `{indicator}`: {reason}")]
    Backend {
        backend: String,
        indicator: String,
        reason: String,
    },

    #[error("{backend} did not answer for `{indicator}` within {timeout_ms} ms")]
    BackendTimeout {
        backend: String,
        indicator: String,
        timeout_ms: u64,
    },

    // ── Lifecycle ───────────────────────────────────────────────────────
    #[error("strategy instance is no longer accepting work")]
    Finished,

    #[error("strategy hook failed: {0:#}")]
    Strategy(anyhow::Error),

    // ── Worker boundary ─────────────────────────────────────────────────
    #[error("Child process has died (exit status {status:?})")]
    ProcessDeath {
        status: Option<i32>,
        stderr_tail: Vec<String>,
    },

    #[error("malformed worker message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Shorthand for [`PipelineError::InvalidArgument`].
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Errors raised at a call site because the caller configured something
    /// that can never work.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::SetupClosed { .. }
                | Self::UnknownIndicator { .. }
                | Self::UnknownBackend { .. }
                | Self::DuplicateIndicator { .. }
                | Self::InvalidParameter { .. }
        )
    }

    /// Errors after which the strategy instance must not process more ticks.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Backend { .. }
                | Self::BackendTimeout { .. }
                | Self::ProcessDeath { .. }
                | Self::Strategy(_)
        ) || self.is_configuration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_closed_is_configuration() {
        let err = PipelineError::SetupClosed { name: "ema".into() };
        assert!(err.is_configuration());
        assert!(err.is_fatal());
        assert!(err.to_string().contains("ema"));
    }

    #[test]
    fn backend_errors_are_fatal_but_not_configuration() {
        let err = PipelineError::BackendTimeout {
            backend: "native".into(),
            indicator: "rsi".into(),
            timeout_ms: 50,
        };
        assert!(!err.is_configuration());
        assert!(err.is_fatal());
    }

    #[test]
    fn process_death_message() {
        let err = PipelineError::ProcessDeath {
            status: Some(1),
            stderr_tail: vec![],
        };
        assert_eq!(err.to_string(), "Child process has died (exit status Some(1))");
    }

    #[test]
    fn finished_is_not_fatal() {
        assert!(!PipelineError::Finished.is_fatal());
    }
}
