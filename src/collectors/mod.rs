use crate::engine::Engine;
use anyhow::Result;
use config::CollectorContext;
use std::collections::HashMap;

#[macro_use]
mod register_macro;

pub trait Collector {
    fn name(&self) -> &'static str;

    fn enabled_by_default(&self) -> bool;

    /// Build the engine that runs this collector. The registry applies the
    /// backoff and interval and starts it.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be set up.
    fn engine(&self, ctx: &CollectorContext) -> Result<Engine>;
}

// Every built-in collector, in start order
register_collectors! {
    inventory => InventoryCollector,
    portscan => PortscanCollector,
    exporter => ExporterCollector,
}

// Other modules
pub mod config;
pub mod registry;
