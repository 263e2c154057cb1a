use super::gate::PublishGate;
use crate::engine::EngineRegistry;
use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder, proto::MetricFamily};

/// Shared exposition state: the prometheus registry every collector
/// registers into, the gate that makes swaps atomic, and the registry of
/// running engines used for self-stats and readiness.
#[derive(Clone)]
pub struct MetricsHub {
    registry: Registry,
    gate: PublishGate,
    engines: EngineRegistry,
}

impl Default for MetricsHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            gate: PublishGate::new(),
            engines: EngineRegistry::new(),
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub const fn gate(&self) -> &PublishGate {
        &self.gate
    }

    #[must_use]
    pub const fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    /// Gather all families while no swap is in flight.
    #[must_use]
    pub fn gather(&self) -> Vec<MetricFamily> {
        let _guard = self.gate.read();
        self.registry.gather()
    }

    /// Render the current snapshot in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn render(&self) -> Result<String> {
        let families = self.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
