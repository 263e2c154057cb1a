use crate::engine::UnitSource;
use crate::labels;
use crate::metrics::Labels;
use anyhow::{Result, anyhow};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Unit name used for `--target` values without a `unit=` prefix.
pub const DEFAULT_UNIT: &str = "default";

/// A host to scan. Identity is the address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortscanTarget {
    pub address: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PortscanTarget {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One open port found on a target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortscanResult {
    pub target: String,
    pub labels: Labels,
    pub value: f64,
}

impl PortscanResult {
    #[must_use]
    pub fn open_tcp(address: &str, port: u16) -> Self {
        Self {
            target: address.to_string(),
            labels: labels! {
                "address" => address,
                "protocol" => "TCP",
                "port" => port,
            },
            value: 1.0,
        }
    }

    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.labels.get("port").and_then(|port| port.parse().ok())
    }
}

/// Source of scan targets, grouped by unit.
///
/// A cloud-backed provider lists accounts as units and their public IPs as
/// targets; [`StaticTargets`] serves a fixed set from the command line.
pub trait TargetProvider: Send + Sync {
    fn units(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    fn targets<'a>(&'a self, unit: &'a str) -> BoxFuture<'a, Result<Vec<PortscanTarget>>>;

    /// Identity of the provider's configuration, folded into cache tags so
    /// that cached snapshots of a different target set are never restored.
    fn cache_key(&self) -> String {
        String::new()
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticTargets {
    units: BTreeMap<String, Vec<PortscanTarget>>,
}

impl StaticTargets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `[unit=]address` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if an address is not an IP address or a unit is empty.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let mut targets = Self::new();

        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }

            let (unit, address) = match entry.split_once('=') {
                Some((unit, address)) => (unit.trim(), address.trim()),
                None => (DEFAULT_UNIT, entry),
            };

            if unit.is_empty() {
                return Err(anyhow!("empty unit name in target '{entry}'"));
            }

            address
                .parse::<IpAddr>()
                .map_err(|e| anyhow!("invalid target address '{address}': {e}"))?;

            targets.insert(unit, address);
        }

        Ok(targets)
    }

    /// Add `address` to `unit`; duplicate addresses within a unit are ignored.
    pub fn insert(&mut self, unit: &str, address: &str) {
        let targets = self.units.entry(unit.to_string()).or_default();

        if targets.iter().any(|target| target.address == address) {
            return;
        }

        targets.push(PortscanTarget::new(address).with_metadata("unit", unit));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Total number of targets across units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.values().map(Vec::len).sum()
    }
}

impl TargetProvider for StaticTargets {
    fn units(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move { Ok(self.units.keys().cloned().collect()) })
    }

    fn targets<'a>(&'a self, unit: &'a str) -> BoxFuture<'a, Result<Vec<PortscanTarget>>> {
        Box::pin(async move {
            self.units
                .get(unit)
                .cloned()
                .ok_or_else(|| anyhow!("unknown unit '{unit}'"))
        })
    }

    fn cache_key(&self) -> String {
        serde_json::to_string(&self.units).unwrap_or_default()
    }
}

/// Exposes a provider's unit names to a fan-out engine.
#[derive(Clone)]
pub struct ProviderUnits(pub Arc<dyn TargetProvider>);

impl UnitSource<String> for ProviderUnits {
    fn units(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        self.0.units()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_groups_by_unit() -> Result<()> {
        let targets = StaticTargets::parse(&[
            "prod=10.0.0.1",
            "prod=10.0.0.2",
            "10.0.0.3",
            "prod=10.0.0.1",
            "",
        ])?;

        assert_eq!(targets.len(), 3);
        assert_eq!(targets.units().await?, vec!["default", "prod"]);

        let prod = targets.targets("prod").await?;
        assert_eq!(prod.len(), 2);
        assert_eq!(prod[0].metadata.get("unit").map(String::as_str), Some("prod"));

        assert!(targets.targets("missing").await.is_err());

        let reordered = StaticTargets::parse(&["10.0.0.3", "prod=10.0.0.2", "prod=10.0.0.1"])?;
        assert_ne!(targets.cache_key(), reordered.cache_key());
        assert_eq!(targets.cache_key(), targets.clone().cache_key());
        Ok(())
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        assert!(StaticTargets::parse(&["prod=not-an-ip"]).is_err());
        assert!(StaticTargets::parse(&["=10.0.0.1"]).is_err());
        assert!(StaticTargets::parse(&["::1"]).is_ok());
    }

    #[test]
    fn test_open_tcp_labels() {
        let result = PortscanResult::open_tcp("10.0.0.1", 22);
        assert_eq!(result.port(), Some(22));
        assert_eq!(result.labels.get("protocol").map(String::as_str), Some("TCP"));
        assert_eq!(result.labels.len(), 3);
        assert!((result.value - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_provider_units_as_unit_source() -> Result<()> {
        let provider: Arc<dyn TargetProvider> = Arc::new(StaticTargets::parse(&["a=127.0.0.1"])?);
        let units = ProviderUnits(provider);
        assert_eq!(UnitSource::units(&units).await?, vec!["a".to_string()]);
        Ok(())
    }
}
