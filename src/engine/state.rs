use super::error::EngineError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::warn;

/// Escalating delays applied after consecutive pass failures.
///
/// The first failure waits `tiers[0]`, the second `tiers[1]`, and so on; the
/// position saturates at the last tier and goes back to 0 on success.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackoffLadder {
    tiers: Vec<Duration>,
    position: usize,
}

impl BackoffLadder {
    /// # Errors
    ///
    /// Returns an error if `tiers` is empty or not non-decreasing.
    pub fn new(tiers: Vec<Duration>) -> Result<Self, EngineError> {
        if tiers.is_empty() {
            return Err(EngineError::InvalidBackoff {
                reason: "at least one tier is required".to_string(),
            });
        }

        if tiers.windows(2).any(|w| matches!(w, [a, b] if b < a)) {
            return Err(EngineError::InvalidBackoff {
                reason: format!("tiers must not decrease: {tiers:?}"),
            });
        }

        Ok(Self { tiers, position: 0 })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.tiers.is_empty()
    }

    #[must_use]
    pub fn tiers(&self) -> &[Duration] {
        &self.tiers
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Delay for the failure just observed; advances the position.
    /// `None` when no ladder is configured.
    pub fn on_failure(&mut self) -> Option<Duration> {
        let delay = self
            .tiers
            .get(self.position)
            .or_else(|| self.tiers.last())
            .copied();

        if self.position + 1 < self.tiers.len() {
            self.position += 1;
        }

        delay
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    /// Fresh data collected and published.
    Collected,
    /// Collection skipped, cached snapshot published.
    Cached,
    /// Nothing published, previous snapshot stays exposed.
    Failed,
}

impl PassStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Collected => "collected",
            Self::Cached => "cached",
            Self::Failed => "failed",
        }
    }
}

/// Scheduling and bookkeeping of one engine.
#[derive(Clone, Debug)]
pub struct CollectorState {
    pub name: String,
    pub interval: Duration,
    pub backoff: BackoffLadder,
    pub last_start: Option<DateTime<Utc>>,
    pub last_duration: Option<Duration>,
    pub next_wake: Option<DateTime<Utc>>,
    pub last_status: Option<PassStatus>,
    pub last_error: Option<String>,
    pub last_samples: usize,
    pub consecutive_failures: u32,
    pub passes_total: u64,
    pub failures_total: u64,
    /// Set once the engine has published its first snapshot.
    pub ready: bool,
}

impl CollectorState {
    #[must_use]
    pub fn new(name: &str, interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            interval,
            backoff: BackoffLadder::default(),
            last_start: None,
            last_duration: None,
            next_wake: None,
            last_status: None,
            last_error: None,
            last_samples: 0,
            consecutive_failures: 0,
            passes_total: 0,
            failures_total: 0,
            ready: false,
        }
    }
}

pub type SharedState = Arc<RwLock<CollectorState>>;

pub(crate) fn read_state(state: &SharedState) -> RwLockReadGuard<'_, CollectorState> {
    match state.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("collector state read lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

pub(crate) fn write_state(state: &SharedState) -> RwLockWriteGuard<'_, CollectorState> {
    match state.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("collector state write lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
