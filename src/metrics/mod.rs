//! Metric accumulation and exposition.
//!
//! Collectors write [`Sample`]s into a [`MetricSink`] during a pass. One
//! aggregator drains them into a [`MetricSnapshot`] of [`MetricList`]s, and
//! the engine swaps that snapshot onto a collector's [`MetricSet`] under the
//! [`PublishGate`].

mod gate;
mod hub;
mod list;
mod set;
mod sink;

pub use gate::PublishGate;
pub use hub::MetricsHub;
pub use list::{Labels, MetricList, MetricRow, MetricSnapshot};
pub use set::MetricSet;
pub use sink::{MetricSink, Sample, aggregate};
