use super::list::{Labels, MetricList, MetricRow, MetricSnapshot};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

/// A single deferred write: which metric, which labels, which value.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub metric: String,
    pub row: MetricRow,
}

/// Producer side of a pass.
///
/// Workers never touch the exposed gauges. Everything they want to publish is
/// sent as a [`Sample`] and only applied once every producer of the pass has
/// finished. Cloning is cheap; the pass is over when the last clone is dropped.
#[derive(Clone, Debug)]
pub struct MetricSink {
    tx: UnboundedSender<Sample>,
}

impl MetricSink {
    /// Create a sink and the receiver the aggregator drains.
    #[must_use]
    pub fn channel() -> (Self, UnboundedReceiver<Sample>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, metric: &str, row: MetricRow) {
        self.forward(Sample {
            metric: metric.to_string(),
            row,
        });
    }

    /// Pass on a sample received from another sink.
    pub fn forward(&self, sample: Sample) {
        if let Err(e) = self.tx.send(sample) {
            debug!(metric = %e.0.metric, "aggregator gone, dropping sample");
        }
    }

    pub fn add(&self, metric: &str, labels: Labels, value: f64) {
        self.send(metric, MetricRow::new(labels, value));
    }

    pub fn add_info(&self, metric: &str, labels: Labels) {
        self.send(metric, MetricRow::info(labels));
    }

    pub fn add_bool(&self, metric: &str, labels: Labels, value: bool) {
        self.send(metric, MetricRow::boolean(labels, value));
    }

    pub fn add_time(&self, metric: &str, labels: Labels, value: DateTime<Utc>) {
        self.send(metric, MetricRow::time(labels, value));
    }

    pub fn add_duration(&self, metric: &str, labels: Labels, value: Duration) {
        self.send(metric, MetricRow::duration(labels, value));
    }

    pub fn add_if_not_zero(&self, metric: &str, labels: Labels, value: f64) {
        if value != 0.0 {
            self.add(metric, labels, value);
        }
    }

    pub fn add_if_greater_zero(&self, metric: &str, labels: Labels, value: f64) {
        if value > 0.0 {
            self.add(metric, labels, value);
        }
    }

    /// Send every row of a locally built list.
    pub fn add_list(&self, metric: &str, list: MetricList) {
        for row in list.rows() {
            self.send(metric, row.clone());
        }
    }
}

/// Drain `rx` until every sender is dropped.
pub async fn aggregate(mut rx: UnboundedReceiver<Sample>) -> MetricSnapshot {
    let mut snapshot = MetricSnapshot::new();

    while let Some(sample) = rx.recv().await {
        snapshot.push(&sample.metric, sample.row);
    }

    snapshot
}
