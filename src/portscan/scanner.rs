use super::hooks::PortscanHooks;
use super::ports::{DEFAULT_PORTS, PortRange};
use super::target::{PortscanResult, PortscanTarget};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, info, instrument, warn};

/// Scan settings. Serialized into the cache tag, so any change invalidates
/// cached results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PortscanConfig {
    pub ports: Vec<PortRange>,
    /// Targets scanned at the same time.
    pub parallel: usize,
    /// Connects in flight per target.
    pub threads: usize,
    #[serde(with = "seconds")]
    pub timeout: Duration,
}

impl Default for PortscanConfig {
    fn default() -> Self {
        Self {
            ports: DEFAULT_PORTS.to_vec(),
            parallel: 2,
            threads: 1000,
            timeout: Duration::from_secs(5),
        }
    }
}

mod seconds {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

#[derive(Debug, Default)]
struct ScanState {
    targets: BTreeMap<String, PortscanTarget>,
    results: HashMap<String, Vec<PortscanResult>>,
}

struct Inner {
    config: PortscanConfig,
    hooks: Arc<dyn PortscanHooks>,
    state: Mutex<ScanState>,
    restored: AtomicBool,
}

/// Concurrent TCP port scanner over a mutable target set.
///
/// Cloning is cheap and every clone shares the same targets and results.
#[derive(Clone)]
pub struct Portscanner {
    inner: Arc<Inner>,
}

impl Portscanner {
    pub fn new(config: PortscanConfig, hooks: Arc<dyn PortscanHooks>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                hooks,
                state: Mutex::new(ScanState::default()),
                restored: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PortscanConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, ScanState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("portscan state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Replace the live target set. Does not start a scan.
    pub fn set_targets(&self, targets: Vec<PortscanTarget>) {
        let targets: BTreeMap<String, PortscanTarget> = targets
            .into_iter()
            .map(|target| (target.address.clone(), target))
            .collect();

        debug!(targets = targets.len(), "portscan targets updated");

        self.lock().targets = targets;
    }

    /// Live target addresses, sorted.
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        self.lock().targets.keys().cloned().collect()
    }

    /// Stored results per target address.
    #[must_use]
    pub fn results(&self) -> BTreeMap<String, Vec<PortscanResult>> {
        self.lock()
            .results
            .iter()
            .map(|(target, results)| (target.clone(), results.clone()))
            .collect()
    }

    /// Drop results of targets no longer in the live set. Returns how many
    /// targets were dropped.
    pub fn cleanup(&self) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        let before = state.results.len();

        let targets = &state.targets;
        state.results.retain(|address, _| targets.contains_key(address));

        let removed = before - state.results.len();
        if removed > 0 {
            debug!(removed, "dropped results of removed targets");
        }
        removed
    }

    /// Hand every stored result to the hooks.
    pub fn publish(&self) {
        let state = self.lock();
        let hooks = &self.inner.hooks;

        hooks.on_result_cleanup();
        for result in state.results.values().flatten() {
            hooks.on_result_publish(result);
        }
        hooks.on_publish_complete();
    }

    /// Run one scan cycle over the live targets.
    #[instrument(skip(self), level = "info")]
    pub async fn start(&self) {
        let started = Instant::now();
        let hooks = Arc::clone(&self.inner.hooks);

        hooks.on_startup_scan();

        if !self.inner.restored.swap(true, Ordering::SeqCst) {
            self.restore_cache().await;
        }

        self.cleanup();
        self.publish();

        let targets: Vec<PortscanTarget> = self.lock().targets.values().cloned().collect();

        info!(
            targets = targets.len(),
            parallel = self.inner.config.parallel,
            threads = self.inner.config.threads,
            "starting portscan"
        );

        let permits = Arc::new(Semaphore::new(self.inner.config.parallel.max(1)));
        let mut scans = JoinSet::new();

        for target in targets {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let scanner = self.clone();

            scans.spawn(async move {
                let _permit = permit;
                scanner.scan_target(target).await;
            });
        }

        while let Some(joined) = scans.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "target scan task failed");
            }
        }

        self.cleanup();
        self.publish();

        hooks.on_finish_scan();

        self.store_cache().await;

        info!(elapsed = ?started.elapsed(), "portscan finished");
    }

    async fn scan_target(&self, target: PortscanTarget) {
        let hooks = &self.inner.hooks;
        hooks.on_start_scan_target(&target);

        let started = Instant::now();

        let results = match target.address.parse::<IpAddr>() {
            Ok(ip) => self.scan_ports(ip, &target.address).await,
            Err(e) => {
                warn!(address = %target.address, error = %e, "invalid target address, skipping");
                Vec::new()
            }
        };

        let elapsed = started.elapsed();
        let open = results.len();

        if self.commit(&target, results) {
            debug!(address = %target.address, open, elapsed = ?elapsed, "target scanned");
        } else {
            debug!(address = %target.address, "target removed during scan, discarding results");
        }

        hooks.on_finish_scan_target(&target, elapsed);
    }

    /// Store results if the target is still live.
    fn commit(&self, target: &PortscanTarget, results: Vec<PortscanResult>) -> bool {
        let mut state = self.lock();

        if !state.targets.contains_key(&target.address) {
            return false;
        }

        state.results.insert(target.address.clone(), results);
        true
    }

    async fn scan_ports(&self, ip: IpAddr, address: &str) -> Vec<PortscanResult> {
        let config = &self.inner.config;
        let permits = Arc::new(Semaphore::new(config.threads.max(1)));
        let mut probes = JoinSet::new();

        for range in &config.ports {
            for port in range.ports() {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let timeout = config.timeout;

                probes.spawn(async move {
                    let _permit = permit;
                    is_open(SocketAddr::new(ip, port), timeout)
                        .await
                        .then_some(port)
                });
            }
        }

        let mut open = Vec::new();
        while let Some(joined) = probes.join_next().await {
            if let Ok(Some(port)) = joined {
                open.push(port);
            }
        }

        open.sort_unstable();
        open.dedup();

        open.into_iter()
            .map(|port| PortscanResult::open_tcp(address, port))
            .collect()
    }

    async fn restore_cache(&self) {
        let Some(data) = self.inner.hooks.on_cache_restore().await else {
            return;
        };

        match serde_json::from_value::<HashMap<String, Vec<PortscanResult>>>(data) {
            Ok(cached) => {
                let mut state = self.lock();
                let targets = cached.len();

                for (address, results) in cached {
                    state.results.entry(address).or_insert(results);
                }

                info!(targets, "restored portscan results from cache");
            }
            Err(e) => warn!(error = %e, "ignoring unreadable portscan cache"),
        }
    }

    async fn store_cache(&self) {
        let data = serde_json::to_value(&self.lock().results);

        match data {
            Ok(data) => self.inner.hooks.on_cache_store(data).await,
            Err(e) => warn!(error = %e, "failed to encode portscan results"),
        }
    }
}

async fn is_open(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(time::timeout(timeout, TcpStream::connect(addr)).await, Ok(Ok(_)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::portscan::NoopHooks;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Recording {
        published: Mutex<Vec<String>>,
        batches: AtomicUsize,
        stored: Mutex<Option<Value>>,
        cached: Option<Value>,
    }

    impl PortscanHooks for Recording {
        fn on_result_cleanup(&self) {
            if let Ok(mut published) = self.published.lock() {
                published.clear();
            }
        }

        fn on_result_publish(&self, result: &PortscanResult) {
            if let Ok(mut published) = self.published.lock() {
                published.push(format!("{}:{}", result.target, result.port().unwrap_or(0)));
            }
        }

        fn on_publish_complete(&self) {
            self.batches.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cache_restore(&self) -> futures::future::BoxFuture<'_, Option<Value>> {
            Box::pin(async move { self.cached.clone() })
        }

        fn on_cache_store(&self, data: Value) -> futures::future::BoxFuture<'_, ()> {
            Box::pin(async move {
                if let Ok(mut stored) = self.stored.lock() {
                    *stored = Some(data);
                }
            })
        }
    }

    impl Recording {
        fn published(&self) -> Vec<String> {
            let mut published = self.published.lock().map(|p| p.clone()).unwrap_or_default();
            published.sort();
            published
        }
    }

    fn config(ports: &[u16]) -> PortscanConfig {
        PortscanConfig {
            ports: ports
                .iter()
                .map(|&port| PortRange::new(port, port).unwrap())
                .collect(),
            parallel: 2,
            threads: 16,
            timeout: Duration::from_millis(500),
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_finds_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = closed_port().await;

        let hooks = Arc::new(Recording::default());
        let scanner = Portscanner::new(config(&[open, closed]), hooks.clone());
        scanner.set_targets(vec![PortscanTarget::new("127.0.0.1")]);

        scanner.start().await;

        let results = scanner.results();
        let found: Vec<u16> = results["127.0.0.1"].iter().filter_map(PortscanResult::port).collect();
        assert_eq!(found, vec![open]);

        assert_eq!(hooks.published(), vec![format!("127.0.0.1:{open}")]);
        // once before scanning, once after
        assert_eq!(hooks.batches.load(Ordering::SeqCst), 2);
        assert!(hooks.stored.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_address_yields_no_results() {
        let scanner = Portscanner::new(config(&[22]), Arc::new(NoopHooks));
        scanner.set_targets(vec![PortscanTarget::new("not-an-ip")]);

        scanner.start().await;

        assert_eq!(scanner.results().get("not-an-ip").map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_cleanup_drops_removed_targets() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();

        let hooks = Arc::new(Recording::default());
        let scanner = Portscanner::new(config(&[open]), hooks.clone());
        scanner.set_targets(vec![
            PortscanTarget::new("127.0.0.1"),
            PortscanTarget::new("127.0.0.2"),
        ]);
        scanner.start().await;
        assert_eq!(scanner.results().len(), 2);

        scanner.set_targets(vec![PortscanTarget::new("127.0.0.2")]);
        assert_eq!(scanner.cleanup(), 1);
        scanner.publish();

        assert_eq!(scanner.targets(), vec!["127.0.0.2".to_string()]);
        assert!(!scanner.results().contains_key("127.0.0.1"));
        assert!(hooks.published().iter().all(|p| !p.starts_with("127.0.0.1:")));
    }

    /// Parks every target scan until the test lets it go.
    struct Stalling {
        entered: tokio::sync::Notify,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl PortscanHooks for Stalling {
        fn on_start_scan_target(&self, _target: &PortscanTarget) {
            self.entered.notify_one();
            if let Ok(release) = self.release.lock() {
                let _ = release.recv_timeout(Duration::from_secs(5));
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_target_removed_during_scan_is_discarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();

        let (go, release) = std::sync::mpsc::channel();
        let hooks = Arc::new(Stalling {
            entered: tokio::sync::Notify::new(),
            release: Mutex::new(release),
        });

        let scanner = Portscanner::new(config(&[open]), hooks.clone());
        scanner.set_targets(vec![PortscanTarget::new("127.0.0.1")]);

        let cycle = tokio::spawn({
            let scanner = scanner.clone();
            async move { scanner.start().await }
        });

        hooks.entered.notified().await;
        scanner.set_targets(vec![PortscanTarget::new("127.0.0.2")]);
        go.send(()).unwrap();

        cycle.await.unwrap();

        assert_eq!(scanner.targets(), vec!["127.0.0.2".to_string()]);
        assert!(!scanner.results().contains_key("127.0.0.1"));
    }

    #[test]
    fn test_commit_discards_stale_target() {
        let scanner = Portscanner::new(config(&[22]), Arc::new(NoopHooks));
        scanner.set_targets(vec![PortscanTarget::new("10.0.0.1")]);

        let gone = PortscanTarget::new("10.0.0.9");
        assert!(!scanner.commit(&gone, vec![PortscanResult::open_tcp("10.0.0.9", 22)]));
        assert!(scanner.results().is_empty());

        let live = PortscanTarget::new("10.0.0.1");
        assert!(scanner.commit(&live, vec![PortscanResult::open_tcp("10.0.0.1", 22)]));
        assert_eq!(scanner.results().len(), 1);
    }

    #[tokio::test]
    async fn test_restores_cache_on_first_cycle_only() {
        let cached = serde_json::json!({
            "10.0.0.1": [PortscanResult::open_tcp("10.0.0.1", 443)],
            "10.0.0.2": [PortscanResult::open_tcp("10.0.0.2", 22)],
        });

        let hooks = Arc::new(Recording {
            cached: Some(cached),
            ..Recording::default()
        });
        // no ports to probe, only the cache counts
        let scanner = Portscanner::new(config(&[]), hooks.clone());
        scanner.set_targets(vec![PortscanTarget::new("10.0.0.1")]);

        scanner.start().await;

        // 10.0.0.2 is not live and was cleaned up; 10.0.0.1 was rescanned
        // with no ports and now has no results.
        assert_eq!(scanner.results().len(), 1);
        assert_eq!(scanner.results().get("10.0.0.1").map(Vec::len), Some(0));
        assert!(hooks.published().is_empty());
    }

    #[test]
    fn test_config_serializes_for_cache_tag() {
        let value = serde_json::to_value(PortscanConfig::default()).unwrap();
        assert_eq!(value["ports"], serde_json::json!(["22", "3389"]));
        assert_eq!(value["timeout"], serde_json::json!(5.0));
    }
}
