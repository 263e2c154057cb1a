use super::target::{PortscanResult, PortscanTarget};
use futures::future::BoxFuture;
use serde_json::Value;
use std::time::Duration;

/// Callbacks fired by the [`Portscanner`](super::Portscanner) during a cycle.
///
/// Every method is a no-op by default. `publish()` calls
/// `on_result_cleanup`, then `on_result_publish` once per stored result, then
/// `on_publish_complete`; all three run while the scanner's state lock is
/// held, so they must not block.
pub trait PortscanHooks: Send + Sync {
    fn on_startup_scan(&self) {}

    fn on_finish_scan(&self) {}

    fn on_start_scan_target(&self, _target: &PortscanTarget) {}

    fn on_finish_scan_target(&self, _target: &PortscanTarget, _elapsed: Duration) {}

    fn on_result_cleanup(&self) {}

    fn on_result_publish(&self, _result: &PortscanResult) {}

    fn on_publish_complete(&self) {}

    /// Previously stored results, read once before the first cycle.
    fn on_cache_restore(&self) -> BoxFuture<'_, Option<Value>> {
        Box::pin(async { None })
    }

    /// Persist the results of a finished cycle.
    fn on_cache_store(&self, _data: Value) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl PortscanHooks for NoopHooks {}
