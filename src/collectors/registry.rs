use crate::collectors::config::{CollectorConfig, CollectorContext};
use crate::collectors::{COLLECTOR_NAMES, Collector, CollectorType, all_factories};
use crate::metrics::MetricsHub;
use crate::portscan::TargetProvider;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Clone)]
pub struct CollectorRegistry {
    collectors: Vec<CollectorType>,
    config: CollectorConfig,
}

impl CollectorRegistry {
    #[must_use]
    pub fn new(config: CollectorConfig) -> Self {
        let factories = all_factories();
        let collectors = COLLECTOR_NAMES
            .iter()
            .filter(|name| config.is_enabled(name))
            .filter_map(|name| factories.get(*name).map(|f| f()))
            .collect();

        Self { collectors, config }
    }

    /// Build the engine of every enabled collector and spawn its loop.
    ///
    /// All engines are built before any is started, so a setup error leaves
    /// nothing running.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector fails to build its engine.
    pub fn start(
        &self,
        hub: &MetricsHub,
        targets: Arc<dyn TargetProvider>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let ctx = CollectorContext::new(hub.clone(), targets, self.config.clone());

        let mut engines = Vec::with_capacity(self.collectors.len());

        for collector in &self.collectors {
            let mut engine = collector
                .engine(&ctx)
                .with_context(|| format!("failed to set up collector '{}'", collector.name()))?;

            if !self.config.backoff.is_empty() {
                engine = engine.with_panic_backoff(self.config.backoff.clone())?;
            }

            debug!(collector = collector.name(), "engine ready");
            engines.push((self.config.interval_for(collector.name()), engine));
        }

        info!(collectors = ?self.collector_names(), "starting collectors");

        Ok(engines
            .into_iter()
            .map(|(interval, engine)| engine.start(interval))
            .collect())
    }

    #[must_use]
    pub fn collector_names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(Collector::name).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_follows_registration_order() {
        let config = CollectorConfig::new().with_enabled(&[
            "exporter".to_string(),
            "inventory".to_string(),
            "unknown".to_string(),
        ]);

        let registry = CollectorRegistry::new(config);
        assert_eq!(registry.collector_names(), vec!["inventory", "exporter"]);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_empty_registry() {
        let registry = CollectorRegistry::new(CollectorConfig::new());
        assert!(registry.is_empty());
    }
}
