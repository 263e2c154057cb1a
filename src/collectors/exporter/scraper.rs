use crate::engine::{EngineRegistry, PassStatus};
use crate::labels;
use crate::metrics::{MetricSet, MetricSink};
use anyhow::Result;

const LAST_DURATION: &str = "cloud_exporter_collector_last_duration_seconds";
const LAST_RUN: &str = "cloud_exporter_collector_last_run_timestamp_seconds";
const NEXT_RUN: &str = "cloud_exporter_collector_next_run_timestamp_seconds";
const INTERVAL: &str = "cloud_exporter_collector_interval_seconds";
const LAST_SAMPLES: &str = "cloud_exporter_collector_last_samples";
const LAST_STATUS: &str = "cloud_exporter_collector_last_status";
const CONSECUTIVE_FAILURES: &str = "cloud_exporter_collector_consecutive_failures";
const PASSES: &str = "cloud_exporter_collector_passes";
const FAILURES: &str = "cloud_exporter_collector_failures";
const READY: &str = "cloud_exporter_collector_ready";

const STATUSES: [PassStatus; 3] = [PassStatus::Collected, PassStatus::Cached, PassStatus::Failed];

/// Per-collector run statistics, read from the engine registry.
///
/// ```promql
/// # Slowest collectors
/// topk(5, cloud_exporter_collector_last_duration_seconds)
///
/// # Collectors stuck in backoff
/// cloud_exporter_collector_consecutive_failures > 0
/// ```
pub struct ScrapeStats {
    engines: EngineRegistry,
}

impl ScrapeStats {
    pub const fn new(engines: EngineRegistry) -> Self {
        Self { engines }
    }

    pub fn setup(metrics: &mut MetricSet) -> Result<()> {
        let collector = &["collector"];

        metrics.gauge(LAST_DURATION, "Duration of the last pass in seconds", collector)?;
        metrics.gauge(LAST_RUN, "Unix time the last pass started", collector)?;
        metrics.gauge(NEXT_RUN, "Unix time the next pass is scheduled", collector)?;
        metrics.gauge(INTERVAL, "Configured interval in seconds", collector)?;
        metrics.gauge(LAST_SAMPLES, "Samples published by the last successful pass", collector)?;
        metrics.gauge(
            LAST_STATUS,
            "Outcome of the last pass, 1 for the current status",
            &["collector", "status"],
        )?;
        metrics.gauge(
            CONSECUTIVE_FAILURES,
            "Failed passes since the last success",
            collector,
        )?;
        metrics.gauge(PASSES, "Passes run since start", collector)?;
        metrics.gauge(FAILURES, "Failed passes since start", collector)?;
        metrics.gauge(
            READY,
            "Whether the collector has published a snapshot",
            collector,
        )?;
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn sample(&self, sink: &MetricSink) {
        for state in self.engines.snapshot() {
            let name = state.name.as_str();

            if let Some(duration) = state.last_duration {
                sink.add_duration(LAST_DURATION, labels! { "collector" => name }, duration);
            }
            if let Some(start) = state.last_start {
                sink.add_time(LAST_RUN, labels! { "collector" => name }, start);
            }
            if let Some(wake) = state.next_wake {
                sink.add_time(NEXT_RUN, labels! { "collector" => name }, wake);
            }
            if let Some(last) = state.last_status {
                for status in STATUSES {
                    let labels = labels! { "collector" => name, "status" => status.as_str() };
                    sink.add_bool(LAST_STATUS, labels, status == last);
                }
            }

            sink.add_duration(INTERVAL, labels! { "collector" => name }, state.interval);
            sink.add(
                LAST_SAMPLES,
                labels! { "collector" => name },
                state.last_samples as f64,
            );
            sink.add(
                CONSECUTIVE_FAILURES,
                labels! { "collector" => name },
                f64::from(state.consecutive_failures),
            );
            sink.add(PASSES, labels! { "collector" => name }, state.passes_total as f64);
            sink.add(
                FAILURES,
                labels! { "collector" => name },
                state.failures_total as f64,
            );
            sink.add_bool(READY, labels! { "collector" => name }, state.ready);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::CollectorState;
    use crate::metrics::aggregate;
    use std::sync::{Arc, RwLock};
    use std::time::Duration;

    #[tokio::test]
    async fn test_scrape_stats_reads_registry() {
        let engines = EngineRegistry::new();

        let mut done = CollectorState::new("inventory", Duration::from_secs(300));
        done.last_duration = Some(Duration::from_millis(1500));
        done.last_status = Some(PassStatus::Failed);
        done.consecutive_failures = 2;
        engines.register(Arc::new(RwLock::new(done)));
        engines.register(Arc::new(RwLock::new(CollectorState::new(
            "portscan",
            Duration::from_secs(60),
        ))));

        let (sink, rx) = MetricSink::channel();
        ScrapeStats::new(engines).sample(&sink);
        drop(sink);
        let snapshot = aggregate(rx).await;

        let durations = snapshot.list(LAST_DURATION).unwrap();
        assert_eq!(durations.len(), 1);
        assert!((durations.rows().first().unwrap().value - 1.5).abs() < f64::EPSILON);

        let statuses = snapshot.list(LAST_STATUS).unwrap();
        let failed: Vec<_> = statuses
            .rows()
            .iter()
            .filter(|row| row.value > 0.0)
            .map(|row| row.labels["status"].clone())
            .collect();
        assert_eq!(failed, vec!["failed".to_string()]);

        assert_eq!(snapshot.list(READY).unwrap().len(), 2);
        assert_eq!(snapshot.list(INTERVAL).unwrap().len(), 2);
    }
}
