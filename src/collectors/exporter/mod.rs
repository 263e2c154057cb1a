//! Exporter self-monitoring
//!
//! Unlike the other collectors, which report on cloud resources, this one
//! reports on the exporter itself:
//!
//! - **Resource usage** ([`ProcessStats`]): CPU time, memory, threads and
//!   file descriptors of the process, read with `sysinfo` and `/proc`.
//! - **Collector health** ([`ScrapeStats`]): last pass duration, schedule,
//!   status and failure counts of every engine, read from the
//!   [`EngineRegistry`](crate::engine::EngineRegistry).
//!
//! It runs on its own short interval (`--scrape.time.exporter`) so that a
//! collector stuck in backoff is visible long before its next pass.
//!
//! # Example `Prometheus` Queries
//!
//! ```promql
//! # Collectors whose last pass failed
//! cloud_exporter_collector_last_status{status="failed"} == 1
//!
//! # Memory growth
//! deriv(cloud_exporter_process_resident_memory_bytes[1h])
//! ```

mod process;
mod scraper;

pub use process::ProcessStats;
pub use scraper::ScrapeStats;

use crate::collectors::Collector;
use crate::collectors::config::CollectorContext;
use crate::engine::{CustomProcessor, Engine, EngineRegistry};
use crate::metrics::{MetricSet, MetricSink};
use anyhow::Result;
use futures::future::BoxFuture;
use tracing::instrument;

/// ExporterCollector publishes the exporter's own health
#[derive(Clone)]
pub struct ExporterCollector;

impl Default for ExporterCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for ExporterCollector {
    fn name(&self) -> &'static str {
        "exporter"
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    fn engine(&self, ctx: &CollectorContext) -> Result<Engine> {
        let processor = ExporterProcessor::new(ctx.hub.engines().clone());
        Ok(Engine::custom(self.name(), processor, &ctx.hub)?)
    }
}

pub struct ExporterProcessor {
    process: ProcessStats,
    scrapes: ScrapeStats,
}

impl ExporterProcessor {
    pub fn new(engines: EngineRegistry) -> Self {
        Self {
            process: ProcessStats::new(),
            scrapes: ScrapeStats::new(engines),
        }
    }
}

impl CustomProcessor for ExporterProcessor {
    fn setup(&mut self, metrics: &mut MetricSet) -> Result<()> {
        ProcessStats::setup(metrics)?;
        ScrapeStats::setup(metrics)?;
        Ok(())
    }

    #[instrument(skip(self, sink), level = "debug", fields(collector = "exporter"))]
    fn collect(&self, sink: MetricSink) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.process.sample(&sink);
            self.scrapes.sample(&sink);
            Ok(())
        })
    }
}
