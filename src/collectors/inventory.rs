use crate::collectors::Collector;
use crate::collectors::config::CollectorContext;
use crate::engine::{Engine, Processor};
use crate::labels;
use crate::metrics::{MetricSet, MetricSink};
use crate::portscan::{ProviderUnits, TargetProvider};
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument};

const TARGET_INFO: &str = "cloud_exporter_target_info";
const UNIT_TARGETS: &str = "cloud_exporter_unit_targets";

/// Publishes the known targets of every unit
#[derive(Clone)]
pub struct InventoryCollector;

impl InventoryCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InventoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for InventoryCollector {
    fn name(&self) -> &'static str {
        "inventory"
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    fn engine(&self, ctx: &CollectorContext) -> Result<Engine> {
        let processor = InventoryProcessor::new(Arc::clone(&ctx.targets));
        let units = Arc::new(ProviderUnits(Arc::clone(&ctx.targets)));

        let engine = Engine::fan_out(self.name(), processor, units, &ctx.hub)?;

        ctx.cached(engine, &json!({ "targets": ctx.targets.cache_key() }))
    }
}

/// Fan-out processor: one unit per provider unit.
pub struct InventoryProcessor {
    targets: Arc<dyn TargetProvider>,
}

impl InventoryProcessor {
    pub fn new(targets: Arc<dyn TargetProvider>) -> Self {
        Self { targets }
    }
}

impl Processor for InventoryProcessor {
    type Unit = String;

    fn setup(&mut self, metrics: &mut MetricSet) -> Result<()> {
        metrics.gauge(
            TARGET_INFO,
            "Known scan target, value is always 1",
            &["unit", "address"],
        )?;
        metrics.gauge(UNIT_TARGETS, "Number of targets per unit", &["unit"])?;
        Ok(())
    }

    #[instrument(skip(self, sink), level = "debug")]
    fn collect<'a>(&'a self, unit: &'a String, sink: MetricSink) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let targets = self.targets.targets(unit).await?;

            for target in &targets {
                sink.add_info(
                    TARGET_INFO,
                    labels! { "unit" => unit, "address" => target.address },
                );
            }

            #[allow(clippy::cast_precision_loss)]
            let count = targets.len() as f64;
            sink.add(UNIT_TARGETS, labels! { "unit" => unit }, count);

            debug!(unit, targets = targets.len(), "listed targets");
            Ok(())
        })
    }
}
