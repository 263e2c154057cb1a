//! Concurrent TCP port scanner over a changing target set.
//!
//! [`Portscanner::start`] scans every live target with bounded parallelism
//! (targets × ports per target) and reports results through
//! [`PortscanHooks`]. Targets can be replaced at any time with
//! [`Portscanner::set_targets`]; results of removed targets are dropped on
//! the next [`Portscanner::cleanup`] and in-flight scans of removed targets
//! are discarded.

mod hooks;
mod ports;
mod scanner;
mod target;

pub use hooks::{NoopHooks, PortscanHooks};
pub use ports::{DEFAULT_PORTS, PortRange, PortRangeError, parse_port_ranges};
pub use scanner::{PortscanConfig, Portscanner};
pub use target::{
    DEFAULT_UNIT, PortscanResult, PortscanTarget, ProviderUnits, StaticTargets, TargetProvider,
};
