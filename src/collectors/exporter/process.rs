use crate::labels;
use crate::metrics::{MetricSet, MetricSink};
use anyhow::Result;
use std::sync::{Mutex, MutexGuard};
use sysinfo::{Pid, System};
use tracing::{debug, warn};

const CPU_SECONDS: &str = "cloud_exporter_process_cpu_seconds";
const CPU_CORES: &str = "cloud_exporter_process_cpu_cores";
const RESIDENT_MEMORY: &str = "cloud_exporter_process_resident_memory_bytes";
const VIRTUAL_MEMORY: &str = "cloud_exporter_process_virtual_memory_bytes";
const OPEN_FDS: &str = "cloud_exporter_process_open_fds";
const THREADS: &str = "cloud_exporter_process_threads";
const START_TIME: &str = "cloud_exporter_process_start_time_seconds";

/// Resource usage of the exporter process itself.
///
/// CPU time is cumulative across all cores, like node_exporter's
/// `process_cpu_seconds_total`; divide its rate by
/// `cloud_exporter_process_cpu_cores` for a per-core percentage:
///
/// ```promql
/// rate(cloud_exporter_process_cpu_seconds[5m]) / cloud_exporter_process_cpu_cores * 100
/// ```
///
/// Thread and file descriptor counts are read from `/proc` and only
/// published on Linux.
pub struct ProcessStats {
    /// Reused across passes.
    system: Mutex<System>,
    pid: Pid,
    num_cores: usize,
}

impl Default for ProcessStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessStats {
    pub fn new() -> Self {
        let system = System::new_all();
        let num_cores = system.cpus().len().max(1);

        Self {
            system: Mutex::new(system),
            pid: Pid::from_u32(std::process::id()),
            num_cores,
        }
    }

    pub fn setup(metrics: &mut MetricSet) -> Result<()> {
        metrics.gauge(
            CPU_SECONDS,
            "Total user and system CPU time spent in seconds (cumulative across all cores)",
            &[],
        )?;
        metrics.gauge(CPU_CORES, "Number of CPU cores available to the system", &[])?;
        metrics.gauge(RESIDENT_MEMORY, "Resident memory size in bytes (RSS)", &[])?;
        metrics.gauge(VIRTUAL_MEMORY, "Virtual memory size in bytes (VSZ)", &[])?;
        metrics.gauge(OPEN_FDS, "Number of open file descriptors", &[])?;
        metrics.gauge(THREADS, "Number of OS threads in the process", &[])?;
        metrics.gauge(
            START_TIME,
            "Start time of the process since unix epoch in seconds",
            &[],
        )?;
        Ok(())
    }

    fn system(&self) -> MutexGuard<'_, System> {
        match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("process stats mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn sample(&self, sink: &MetricSink) {
        let mut system = self.system();
        system.refresh_all();

        sink.add(CPU_CORES, labels!(), self.num_cores as f64);

        let Some(process) = system.process(self.pid) else {
            warn!(pid = %self.pid, "exporter process not found");
            return;
        };

        let rss = process.memory();
        let vsz = process.virtual_memory();
        let cpu_seconds = process.accumulated_cpu_time() as f64 / 1000.0;

        sink.add(RESIDENT_MEMORY, labels!(), rss as f64);
        sink.add(VIRTUAL_MEMORY, labels!(), vsz as f64);
        sink.add(CPU_SECONDS, labels!(), cpu_seconds);
        sink.add(START_TIME, labels!(), process.start_time() as f64);

        #[cfg(target_os = "linux")]
        {
            if let Some(threads) = count_entries(&format!("/proc/{}/task", self.pid)) {
                sink.add(THREADS, labels!(), threads as f64);
            }
            if let Some(fds) = count_entries(&format!("/proc/{}/fd", self.pid)) {
                sink.add(OPEN_FDS, labels!(), fds as f64);
            }
        }

        debug!(
            rss_mb = rss / 1024 / 1024,
            vsz_mb = vsz / 1024 / 1024,
            cpu_seconds,
            cpu_cores = self.num_cores,
            "collected process metrics"
        );
    }
}

#[cfg(target_os = "linux")]
fn count_entries(dir: &str) -> Option<usize> {
    std::fs::read_dir(dir).ok().map(Iterator::count)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsHub, aggregate};

    #[tokio::test]
    async fn test_process_stats_samples() {
        let stats = ProcessStats::new();
        assert!(stats.num_cores > 0);

        let (sink, rx) = MetricSink::channel();
        stats.sample(&sink);
        drop(sink);

        let snapshot = aggregate(rx).await;
        let rss = snapshot.list(RESIDENT_MEMORY).unwrap();
        assert_eq!(rss.len(), 1);
        assert!(rss.rows()[0].value > 0.0);

        let start = snapshot.list(START_TIME).unwrap();
        assert!(start.rows()[0].value > 0.0);

        #[cfg(target_os = "linux")]
        {
            assert!(snapshot.list(THREADS).unwrap().rows()[0].value >= 1.0);
            assert!(snapshot.list(OPEN_FDS).unwrap().rows()[0].value >= 3.0);
        }
    }

    #[test]
    fn test_process_stats_registers() {
        let hub = MetricsHub::new();
        let mut metrics = MetricSet::new("exporter", &hub);
        ProcessStats::setup(&mut metrics).unwrap();

        let names: Vec<&str> = metrics.names().collect();
        assert!(names.contains(&CPU_SECONDS));
        assert!(names.contains(&START_TIME));
        assert_eq!(names.len(), 7);
    }
}
