use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Serializes snapshot swaps against scrapes.
///
/// A swap (reset + apply) holds the write side; `/metrics` holds the read
/// side while gathering. A scrape therefore sees either the complete previous
/// snapshot or the complete next one.
///
/// Poisoning is recovered with `into_inner()`: the guarded value is `()`, so a
/// panic in one swap can never leave it inconsistent.
#[derive(Clone, Debug, Default)]
pub struct PublishGate {
    lock: Arc<RwLock<()>>,
}

impl PublishGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ()> {
        match self.lock.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("publish gate read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ()> {
        match self.lock.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("publish gate write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
