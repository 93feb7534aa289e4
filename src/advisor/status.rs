// =============================================================================
// Pipeline Status — shared, read-mostly view of one strategy instance
// =============================================================================
//
// The orchestrator owns all of its state exclusively; other tasks (the worker
// supervisor, a progress logger) only ever need counters. Those are
// published into a `parking_lot::RwLock` after every state change and read
// through cheap snapshots.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Initializing,
    Ready,
    Finishing,
    Finished,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Finishing => write!(f, "finishing"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Counters of one strategy instance at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub instance: Uuid,
    pub phase: Phase,
    /// Small candles admitted.
    pub age: u64,
    /// Small candles whose decision step has completed.
    pub processed: u64,
    pub deferred: usize,
    pub in_flight: usize,
    pub last_candle: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineStatus {
    fn new(instance: Uuid) -> Self {
        Self {
            instance,
            phase: Phase::Initializing,
            age: 0,
            processed: 0,
            deferred: 0,
            in_flight: 0,
            last_candle: None,
            updated_at: Utc::now(),
        }
    }

    pub fn caught_up(&self) -> bool {
        self.age == self.processed
    }
}

/// Cloneable handle to a published [`PipelineStatus`].
#[derive(Debug, Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<PipelineStatus>>,
}

impl StatusHandle {
    pub fn new(instance: Uuid) -> Self {
        Self {
            inner: Arc::new(RwLock::new(PipelineStatus::new(instance))),
        }
    }

    pub fn snapshot(&self) -> PipelineStatus {
        self.inner.read().clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.read().phase
    }

    pub(crate) fn publish(&self, update: impl FnOnce(&mut PipelineStatus)) {
        let mut status = self.inner.write();
        update(&mut status);
        status.updated_at = Utc::now();
    }
}
