use crate::cache::{CacheEntry, CacheStore, tag_for};
use crate::collectors::Collector;
use crate::collectors::config::CollectorContext;
use crate::engine::{CustomProcessor, Engine};
use crate::labels;
use crate::metrics::{MetricList, MetricRow, MetricSet, MetricSink, MetricSnapshot};
use crate::portscan::{PortscanHooks, PortscanResult, PortscanTarget, Portscanner, TargetProvider};
use anyhow::Result;
use chrono::Utc;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const OPEN_PORT: &str = "cloud_exporter_portscan_open_port";
const TARGETS: &str = "cloud_exporter_portscan_targets";
const OPEN_PORTS: &str = "cloud_exporter_portscan_open_ports";
const DURATION: &str = "cloud_exporter_portscan_duration_seconds";
const LAST_SCAN: &str = "cloud_exporter_portscan_last_scan_timestamp_seconds";

/// Families published by the engine at the end of a pass. The open port
/// family is owned by the scanner hooks and survives engine resets.
const STATUS_FAMILIES: [&str; 4] = [TARGETS, OPEN_PORTS, DURATION, LAST_SCAN];

/// Scans every target of every unit for open TCP ports
#[derive(Clone)]
pub struct PortscanCollector;

impl PortscanCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PortscanCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for PortscanCollector {
    fn name(&self) -> &'static str {
        "portscan"
    }

    fn enabled_by_default(&self) -> bool {
        false
    }

    fn engine(&self, ctx: &CollectorContext) -> Result<Engine> {
        let config = &ctx.config.portscan;

        let cache = match ctx.config.cache_location(self.name()) {
            Some(location) => {
                let tag = tag_for(self.name(), &json!({ "portscan": config }))?;
                Some(ScanCache {
                    store: CacheStore::new(&location)?,
                    tag,
                })
            }
            None => None,
        };

        let hooks = Arc::new(PublishHooks::new(cache));
        let scanner = Portscanner::new(config.clone(), hooks.clone());
        let processor = PortscanProcessor::new(Arc::clone(&ctx.targets), scanner, hooks);

        Ok(Engine::custom(self.name(), processor, &ctx.hub)?)
    }
}

struct ScanCache {
    store: CacheStore,
    tag: String,
}

/// Turns scanner callbacks into gauge updates.
///
/// Results are staged between `on_result_cleanup` and `on_publish_complete`
/// and then swapped onto the open port family in one step, so a scrape
/// never sees a half-published result set.
pub(crate) struct PublishHooks {
    metrics: OnceCell<MetricSet>,
    staged: Mutex<MetricList>,
    cache: Option<ScanCache>,
}

impl PublishHooks {
    fn new(cache: Option<ScanCache>) -> Self {
        Self {
            metrics: OnceCell::new(),
            staged: Mutex::new(MetricList::new()),
            cache,
        }
    }

    fn staged(&self) -> MutexGuard<'_, MetricList> {
        match self.staged.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("staged results lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl PortscanHooks for PublishHooks {
    fn on_startup_scan(&self) {
        debug!("portscan cycle started");
    }

    fn on_finish_scan_target(&self, target: &PortscanTarget, elapsed: Duration) {
        debug!(address = %target.address, unit = ?target.metadata.get("unit"), elapsed = ?elapsed, "target done");
    }

    fn on_result_cleanup(&self) {
        self.staged().clear();
    }

    fn on_result_publish(&self, result: &PortscanResult) {
        self.staged()
            .push(MetricRow::new(result.labels.clone(), result.value));
    }

    fn on_publish_complete(&self) {
        let Some(metrics) = self.metrics.get() else {
            return;
        };

        let mut snapshot = MetricSnapshot::new();
        *snapshot.list_mut(OPEN_PORT) = std::mem::take(&mut *self.staged());

        let applied = metrics.swap(&snapshot, |metrics| metrics.reset_only(&[OPEN_PORT]));
        debug!(open_ports = applied, "published portscan results");
    }

    fn on_cache_restore(&self) -> BoxFuture<'_, Option<Value>> {
        Box::pin(async move {
            let cache = self.cache.as_ref()?;
            let entry = cache.store.load().await?;

            if entry.tag != cache.tag {
                debug!(cached_tag = %entry.tag, "portscan cache from another configuration");
                return None;
            }

            Some(entry.payload)
        })
    }

    fn on_cache_store(&self, data: Value) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let Some(cache) = &self.cache else {
                return;
            };

            let entry = CacheEntry::new(cache.tag.clone(), data, None);
            if let Err(e) = cache.store.save(&entry).await {
                warn!(error = %e, "failed to write portscan cache");
            }
        })
    }
}

/// Single-run processor: refresh targets, scan, publish status.
pub(crate) struct PortscanProcessor {
    targets: Arc<dyn TargetProvider>,
    scanner: Portscanner,
    hooks: Arc<PublishHooks>,
}

impl PortscanProcessor {
    pub fn new(
        targets: Arc<dyn TargetProvider>,
        scanner: Portscanner,
        hooks: Arc<PublishHooks>,
    ) -> Self {
        Self {
            targets,
            scanner,
            hooks,
        }
    }

    async fn gather_targets(&self) -> Result<Vec<PortscanTarget>> {
        let mut targets = Vec::new();

        for unit in self.targets.units().await? {
            match self.targets.targets(&unit).await {
                Ok(found) => targets.extend(found),
                Err(e) => warn!(%unit, error = %e, "failed to list targets, skipping unit"),
            }
        }

        Ok(targets)
    }
}

impl CustomProcessor for PortscanProcessor {
    fn setup(&mut self, metrics: &mut MetricSet) -> Result<()> {
        metrics.gauge(
            OPEN_PORT,
            "Open port found by the last scan, value is always 1",
            &["address", "protocol", "port"],
        )?;
        metrics.gauge(TARGETS, "Number of targets scanned", &[])?;
        metrics.gauge(OPEN_PORTS, "Number of open ports found", &[])?;
        metrics.gauge(DURATION, "Duration of the last scan in seconds", &[])?;
        metrics.gauge(LAST_SCAN, "Unix time the last scan finished", &[])?;

        if self.hooks.metrics.set(metrics.clone()).is_err() {
            warn!("portscan metrics were already bound");
        }

        Ok(())
    }

    fn reset(&self, metrics: &MetricSet) {
        metrics.reset_only(&STATUS_FAMILIES);
    }

    fn collect(&self, sink: MetricSink) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let targets = self.gather_targets().await?;
            let count = targets.len();

            self.scanner.set_targets(targets);

            let started = Instant::now();
            self.scanner.start().await;
            let elapsed = started.elapsed();

            let open_ports: usize = self.scanner.results().values().map(Vec::len).sum();

            #[allow(clippy::cast_precision_loss)]
            let (count, open_ports) = (count as f64, open_ports as f64);

            sink.add(TARGETS, labels!(), count);
            sink.add(OPEN_PORTS, labels!(), open_ports);
            sink.add_duration(DURATION, labels!(), elapsed);
            sink.add_time(LAST_SCAN, labels!(), Utc::now());

            info!(targets = count, open_ports, elapsed = ?elapsed, "portscan pass done");
            Ok(())
        })
    }
}
