use super::error::{PassError, panic_message};
use super::processor::{CustomProcessor, Processor, UnitSource};
use crate::metrics::{MetricSet, MetricSink};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info_span, warn};
use tracing_futures::Instrument as _;

/// What the producers of one pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub units: usize,
    pub failed_units: usize,
}

/// The two engine shapes behind one interface.
pub(crate) trait Pass: Send + Sync + 'static {
    fn reset(&self, metrics: &MetricSet);

    /// Push samples into `sink`. The pass is over once this future resolves
    /// and every clone of `sink` is dropped.
    fn execute(&self, sink: MetricSink) -> BoxFuture<'_, Result<PassReport, PassError>>;
}

pub(crate) struct FanOut<P: Processor> {
    pub(crate) processor: Arc<P>,
    pub(crate) units: Arc<dyn UnitSource<P::Unit>>,
}

impl<P: Processor> Pass for FanOut<P> {
    fn reset(&self, metrics: &MetricSet) {
        self.processor.reset(metrics);
    }

    fn execute(&self, sink: MetricSink) -> BoxFuture<'_, Result<PassReport, PassError>> {
        Box::pin(async move {
            let units = self.units.units().await.map_err(PassError::Units)?;

            let mut workers = JoinSet::new();

            for unit in units {
                let processor = Arc::clone(&self.processor);
                let sink = sink.clone();
                let span = info_span!("collector.unit", unit = %unit);

                workers.spawn(
                    async move {
                        // Rows are staged per unit and only forwarded once the unit succeeds.
                        let (staging, mut staged) = MetricSink::channel();

                        let collected = AssertUnwindSafe(processor.collect(&unit, staging))
                            .catch_unwind()
                            .await;

                        match collected {
                            Ok(Ok(())) => {
                                staged.close();

                                let mut rows = 0_usize;
                                while let Some(sample) = staged.recv().await {
                                    sink.forward(sample);
                                    rows += 1;
                                }

                                debug!(%unit, rows, "unit collected");
                                true
                            }
                            Ok(Err(e)) => {
                                warn!(%unit, error = %e, "unit collection failed, discarding its rows");
                                false
                            }
                            Err(payload) => {
                                warn!(%unit, panic = %panic_message(payload.as_ref()), "unit collection panicked, discarding its rows");
                                false
                            }
                        }
                    }
                    .instrument(span),
                );
            }

            // The workers hold the remaining senders.
            drop(sink);

            let mut report = PassReport::default();

            while let Some(joined) = workers.join_next().await {
                report.units += 1;

                match joined {
                    Ok(true) => {}
                    Ok(false) => report.failed_units += 1,
                    Err(e) => {
                        warn!(error = %e, "unit worker aborted");
                        report.failed_units += 1;
                    }
                }
            }

            Ok(report)
        })
    }
}

pub(crate) struct Custom<P: CustomProcessor> {
    pub(crate) processor: P,
}

impl<P: CustomProcessor> Pass for Custom<P> {
    fn reset(&self, metrics: &MetricSet) {
        self.processor.reset(metrics);
    }

    fn execute(&self, sink: MetricSink) -> BoxFuture<'_, Result<PassReport, PassError>> {
        Box::pin(async move {
            self.processor
                .collect(sink)
                .await
                .map_err(PassError::Collect)?;

            Ok(PassReport::default())
        })
    }
}
