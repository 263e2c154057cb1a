use super::gate::PublishGate;
use super::hub::MetricsHub;
use super::list::{MetricList, MetricSnapshot};
use anyhow::{Result, anyhow};
use prometheus::{GaugeVec, Opts, Registry};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// The gauge families owned by one collector.
///
/// Processors declare their families in `setup()`; the engine then applies
/// whole snapshots to them. Rows are matched to a family by metric name and
/// to a series by label set.
#[derive(Clone)]
pub struct MetricSet {
    collector: String,
    registry: Registry,
    gate: PublishGate,
    families: BTreeMap<String, GaugeVec>,
}

impl MetricSet {
    #[must_use]
    pub fn new(collector: &str, hub: &MetricsHub) -> Self {
        Self {
            collector: collector.to_string(),
            registry: hub.registry().clone(),
            gate: hub.gate().clone(),
            families: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn collector(&self) -> &str {
        &self.collector
    }

    #[must_use]
    pub const fn gate(&self) -> &PublishGate {
        &self.gate
    }

    /// Create and register a gauge family.
    ///
    /// # Errors
    ///
    /// Returns an error if the family already exists in this set or the
    /// registry rejects it (invalid name, duplicate across collectors).
    pub fn gauge(&mut self, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
        if self.families.contains_key(name) {
            return Err(anyhow!(
                "collector {} declared metric {} twice",
                self.collector,
                name
            ));
        }

        let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
        self.registry.register(Box::new(gauge.clone()))?;
        self.families.insert(name.to_string(), gauge.clone());

        debug!(collector = %self.collector, metric = name, "registered gauge");

        Ok(gauge)
    }

    #[must_use]
    pub fn family(&self, name: &str) -> Option<&GaugeVec> {
        self.families.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }

    /// Drop every series of every family.
    pub fn reset(&self) {
        for gauge in self.families.values() {
            gauge.reset();
        }
    }

    /// Drop every series of the named families only.
    pub fn reset_only(&self, names: &[&str]) {
        for name in names {
            if let Some(gauge) = self.families.get(*name) {
                gauge.reset();
            }
        }
    }

    /// Set one series per row. Rows whose label set does not match the
    /// family are skipped. Returns the number of rows applied.
    pub fn apply_list(&self, metric: &str, list: &MetricList) -> usize {
        let Some(gauge) = self.families.get(metric) else {
            warn!(
                collector = %self.collector,
                metric,
                rows = list.len(),
                "dropping rows for undeclared metric"
            );
            return 0;
        };

        let mut applied = 0;

        for row in list.rows() {
            let labels: HashMap<&str, &str> = row
                .labels
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();

            match gauge.get_metric_with(&labels) {
                Ok(series) => {
                    series.set(row.value);
                    applied += 1;
                }
                Err(e) => {
                    warn!(collector = %self.collector, metric, error = %e, "label mismatch, row skipped");
                }
            }
        }

        applied
    }

    /// Apply every list of `snapshot` without taking the gate.
    pub fn apply(&self, snapshot: &MetricSnapshot) -> usize {
        snapshot
            .iter()
            .map(|(metric, list)| self.apply_list(metric, list))
            .sum()
    }

    /// Atomically replace the exposed state: under the write gate run
    /// `reset`, then apply `snapshot`.
    pub fn swap<F>(&self, snapshot: &MetricSnapshot, reset: F) -> usize
    where
        F: FnOnce(&Self),
    {
        let _guard = self.gate.write();
        reset(self);
        self.apply(snapshot)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::labels;
    use crate::metrics::MetricRow;

    fn series_count(hub: &MetricsHub, name: &str) -> usize {
        hub.gather()
            .iter()
            .find(|mf| mf.name() == name)
            .map_or(0, |mf| mf.get_metric().len())
    }

    #[test]
    fn test_gauge_registration_rejects_duplicates() {
        let hub = MetricsHub::new();
        let mut set = MetricSet::new("test", &hub);

        assert!(set.gauge("test_metric", "help", &["a"]).is_ok());
        assert!(set.gauge("test_metric", "help", &["a"]).is_err());

        let mut other = MetricSet::new("other", &hub);
        assert!(other.gauge("test_metric", "help", &["a"]).is_err());
    }

    #[test]
    fn test_apply_skips_bad_rows() {
        let hub = MetricsHub::new();
        let mut set = MetricSet::new("test", &hub);
        set.gauge("test_apply", "help", &["a"]).unwrap();

        let mut snapshot = MetricSnapshot::new();
        snapshot.push("test_apply", MetricRow::new(labels! { "a" => "1" }, 1.0));
        snapshot.push("test_apply", MetricRow::new(labels! { "b" => "1" }, 1.0));
        snapshot.push("undeclared", MetricRow::new(labels!(), 1.0));

        assert_eq!(set.apply(&snapshot), 1);
        assert_eq!(series_count(&hub, "test_apply"), 1);
    }

    #[test]
    fn test_swap_replaces_previous_series() {
        let hub = MetricsHub::new();
        let mut set = MetricSet::new("test", &hub);
        set.gauge("test_swap", "help", &["a"]).unwrap();

        let mut first = MetricSnapshot::new();
        first.push("test_swap", MetricRow::new(labels! { "a" => "old1" }, 1.0));
        first.push("test_swap", MetricRow::new(labels! { "a" => "old2" }, 1.0));
        set.swap(&first, MetricSet::reset);
        assert_eq!(series_count(&hub, "test_swap"), 2);

        let mut second = MetricSnapshot::new();
        second.push("test_swap", MetricRow::new(labels! { "a" => "new" }, 5.0));
        set.swap(&second, MetricSet::reset);
        assert_eq!(series_count(&hub, "test_swap"), 1);
    }

    #[test]
    fn test_reset_only() {
        let hub = MetricsHub::new();
        let mut set = MetricSet::new("test", &hub);
        set.gauge("test_keep", "help", &["a"]).unwrap();
        set.gauge("test_drop", "help", &["a"]).unwrap();

        let mut snapshot = MetricSnapshot::new();
        snapshot.push("test_keep", MetricRow::info(labels! { "a" => "x" }));
        snapshot.push("test_drop", MetricRow::info(labels! { "a" => "x" }));
        set.apply(&snapshot);

        set.reset_only(&["test_drop"]);
        assert_eq!(series_count(&hub, "test_keep"), 1);
        assert_eq!(series_count(&hub, "test_drop"), 0);
        assert_eq!(set.names().count(), 2);
    }
}
