use crate::metrics::{MetricSet, MetricSink};
use anyhow::Result;
use futures::future::BoxFuture;
use std::fmt::Display;

/// Domain logic of a fan-out collector.
///
/// The engine calls [`collect`](Processor::collect) once per unit, in
/// parallel, and applies everything sent to the sink only after every unit
/// has finished. An `Err` from `collect` is scoped to that unit: it is logged
/// and the other units are unaffected.
pub trait Processor: Send + Sync + 'static {
    /// Fan-out granularity, e.g. one subscription. `Display` names it in logs.
    type Unit: Clone + Display + Send + Sync + 'static;

    /// Declare the gauge families this collector publishes.
    ///
    /// # Errors
    ///
    /// Returns an error if a family cannot be registered.
    fn setup(&mut self, metrics: &mut MetricSet) -> Result<()>;

    /// Clear previously exposed series. Runs right before a new snapshot is
    /// applied, under the publish gate.
    fn reset(&self, metrics: &MetricSet) {
        metrics.reset();
    }

    fn collect<'a>(&'a self, unit: &'a Self::Unit, sink: MetricSink) -> BoxFuture<'a, Result<()>>;
}

/// Domain logic of a single-run collector. An `Err` fails the whole pass.
pub trait CustomProcessor: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns an error if a family cannot be registered.
    fn setup(&mut self, metrics: &mut MetricSet) -> Result<()>;

    fn reset(&self, metrics: &MetricSet) {
        metrics.reset();
    }

    fn collect(&self, sink: MetricSink) -> BoxFuture<'_, Result<()>>;
}

/// Produces the unit set of a fan-out collector, once per pass.
pub trait UnitSource<U>: Send + Sync {
    fn units(&self) -> BoxFuture<'_, Result<Vec<U>>>;
}

impl<U> UnitSource<U> for Vec<U>
where
    U: Clone + Send + Sync,
{
    fn units(&self) -> BoxFuture<'_, Result<Vec<U>>> {
        Box::pin(async move { Ok(self.clone()) })
    }
}
