use crate::cache::tag_for;
use crate::engine::Engine;
use crate::metrics::MetricsHub;
use crate::portscan::{PortscanConfig, TargetProvider};
use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default collection interval.
pub const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(300);

/// Default backoff after consecutive pass failures.
pub const DEFAULT_BACKOFF: [Duration; 4] = [
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(10 * 60),
    Duration::from_secs(30 * 60),
];

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub enabled_collectors: HashSet<String>,
    /// Interval of collectors without an override.
    pub scrape_interval: Duration,
    /// Per-collector interval overrides.
    pub intervals: HashMap<String, Duration>,
    /// Empty disables backoff: failed passes retry after the interval.
    pub backoff: Vec<Duration>,
    /// Directory holding one cache file per collector; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    pub portscan: PortscanConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        let intervals = HashMap::from([
            ("exporter".to_string(), Duration::from_secs(10)),
            ("portscan".to_string(), Duration::from_secs(3 * 60 * 60)),
        ]);

        Self {
            enabled_collectors: HashSet::new(),
            scrape_interval: DEFAULT_SCRAPE_INTERVAL,
            intervals,
            backoff: DEFAULT_BACKOFF.to_vec(),
            cache_dir: None,
            portscan: PortscanConfig::default(),
        }
    }
}

impl CollectorConfig {
    /// Create a config with default intervals and nothing enabled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable collectors by name
    #[must_use]
    pub fn with_enabled(mut self, collectors: &[String]) -> Self {
        self.enabled_collectors = collectors.iter().cloned().collect();
        self
    }

    /// Check if a collector is enabled
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_collectors.contains(name)
    }

    #[must_use]
    pub const fn with_scrape_interval(mut self, interval: Duration) -> Self {
        self.scrape_interval = interval;
        self
    }

    #[must_use]
    pub fn with_interval(mut self, collector: &str, interval: Duration) -> Self {
        self.intervals.insert(collector.to_string(), interval);
        self
    }

    #[must_use]
    pub fn interval_for(&self, collector: &str) -> Duration {
        self.intervals
            .get(collector)
            .copied()
            .unwrap_or(self.scrape_interval)
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.cache_dir = dir;
        self
    }

    #[must_use]
    pub fn with_portscan(mut self, portscan: PortscanConfig) -> Self {
        self.portscan = portscan;
        self
    }

    /// Cache file of `collector`, if caching is enabled.
    #[must_use]
    pub fn cache_location(&self, collector: &str) -> Option<String> {
        self.cache_dir.as_ref().map(|dir| {
            dir.join(format!("{collector}.json"))
                .to_string_lossy()
                .into_owned()
        })
    }
}

/// Everything a collector needs to build its engine.
#[derive(Clone)]
pub struct CollectorContext {
    pub hub: MetricsHub,
    pub targets: Arc<dyn TargetProvider>,
    pub config: CollectorConfig,
}

impl CollectorContext {
    #[must_use]
    pub fn new(hub: MetricsHub, targets: Arc<dyn TargetProvider>, config: CollectorConfig) -> Self {
        Self {
            hub,
            targets,
            config,
        }
    }

    /// Enable snapshot caching on `engine` when a cache directory is set.
    /// `identity` is hashed into the tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag cannot be derived or the location is invalid.
    pub fn cached<T: Serialize>(&self, engine: Engine, identity: &T) -> Result<Engine> {
        let Some(location) = self.config.cache_location(engine.name()) else {
            return Ok(engine);
        };

        let tag = tag_for(engine.name(), identity)?;
        Ok(engine.with_cache(&location, &tag)?)
    }
}
