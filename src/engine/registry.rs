use super::state::{CollectorState, SharedState, read_state};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Explicit registry of running engines.
///
/// Engines register their shared state on construction; the exporter
/// self-stats collector and `/readyz` read it.
#[derive(Clone, Debug, Default)]
pub struct EngineRegistry {
    engines: Arc<RwLock<Vec<SharedState>>>,
}

impl EngineRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, state: SharedState) {
        let mut engines = match self.engines.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("engine registry write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        engines.push(state);
    }

    /// Copy of every registered engine's state, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CollectorState> {
        let engines = match self.engines.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("engine registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        engines.iter().map(|state| read_state(state).clone()).collect()
    }

    /// Names of engines that have not published a snapshot yet.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|state| !state.ready)
            .map(|state| state.name)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
