//! Cloud resource exporter for Prometheus.
//!
//! The library exposes the collection engine ([`engine`]), the snapshot
//! cache ([`cache`]), the metric accumulators ([`metrics`]) and the
//! concurrent port scanner ([`portscan`]). The `cloud_exporter` binary wires
//! them together behind an HTTP server ([`exporter`]).

pub mod cache;
pub mod cli;
pub mod collectors;
pub mod engine;
pub mod exporter;
pub mod metrics;
pub mod portscan;
