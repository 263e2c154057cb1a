use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Label set of one sample, ordered so that serialized snapshots are stable.
pub type Labels = BTreeMap<String, String>;

/// Build a [`Labels`] map from `key => value` pairs.
///
/// ```
/// use cloud_exporter::labels;
///
/// let labels = labels! { "unit" => "prod", "address" => "10.0.0.1" };
/// assert_eq!(labels.len(), 2);
/// ```
#[macro_export]
macro_rules! labels {
    () => {
        $crate::metrics::Labels::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut labels = $crate::metrics::Labels::new();
        $(
            labels.insert($key.to_string(), $value.to_string());
        )+
        labels
    }};
}

/// One `(label-set, value)` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub labels: Labels,
    pub value: f64,
}

impl MetricRow {
    #[must_use]
    pub const fn new(labels: Labels, value: f64) -> Self {
        Self { labels, value }
    }

    /// Info-style row, always `1`.
    #[must_use]
    pub const fn info(labels: Labels) -> Self {
        Self::new(labels, 1.0)
    }

    #[must_use]
    pub const fn boolean(labels: Labels, value: bool) -> Self {
        Self::new(labels, if value { 1.0 } else { 0.0 })
    }

    /// Unix timestamp in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn time(labels: Labels, value: DateTime<Utc>) -> Self {
        let seconds = value.timestamp() as f64 + f64::from(value.timestamp_subsec_millis()) / 1000.0;
        Self::new(labels, seconds)
    }

    #[must_use]
    pub fn duration(labels: Labels, value: Duration) -> Self {
        Self::new(labels, value.as_secs_f64())
    }
}

/// Write-only, unordered buffer of rows for a single metric.
///
/// Lists are filled during a pass and applied to the exposed gauges in one
/// sweep by [`MetricSet`](super::MetricSet). They serialize as a plain JSON
/// array so they can be cached as-is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricList {
    rows: Vec<MetricRow>,
}

impl MetricList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: MetricRow) {
        self.rows.push(row);
    }

    pub fn add(&mut self, labels: Labels, value: f64) {
        self.push(MetricRow::new(labels, value));
    }

    pub fn add_info(&mut self, labels: Labels) {
        self.push(MetricRow::info(labels));
    }

    pub fn add_bool(&mut self, labels: Labels, value: bool) {
        self.push(MetricRow::boolean(labels, value));
    }

    pub fn add_time(&mut self, labels: Labels, value: DateTime<Utc>) {
        self.push(MetricRow::time(labels, value));
    }

    pub fn add_duration(&mut self, labels: Labels, value: Duration) {
        self.push(MetricRow::duration(labels, value));
    }

    pub fn add_if_not_zero(&mut self, labels: Labels, value: f64) {
        if value != 0.0 {
            self.add(labels, value);
        }
    }

    pub fn add_if_greater_zero(&mut self, labels: Labels, value: f64) {
        if value > 0.0 {
            self.add(labels, value);
        }
    }

    pub fn extend(&mut self, other: Self) {
        self.rows.extend(other.rows);
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    #[must_use]
    pub fn rows(&self) -> &[MetricRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Everything one pass produced, grouped by metric name.
///
/// This is the unit that gets swapped onto the gauges and the payload that
/// gets persisted by the cache.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSnapshot {
    lists: BTreeMap<String, MetricList>,
}

impl MetricSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable access to the list of `metric`, created on first use.
    pub fn list_mut(&mut self, metric: &str) -> &mut MetricList {
        self.lists.entry(metric.to_string()).or_default()
    }

    #[must_use]
    pub fn list(&self, metric: &str) -> Option<&MetricList> {
        self.lists.get(metric)
    }

    pub fn push(&mut self, metric: &str, row: MetricRow) {
        self.list_mut(metric).push(row);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricList)> {
        self.lists.iter().map(|(name, list)| (name.as_str(), list))
    }

    /// Total number of rows across all metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.values().map(MetricList::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
