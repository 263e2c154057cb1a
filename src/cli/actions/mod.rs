pub mod run;

use crate::collectors::config::CollectorConfig;
use crate::portscan::StaticTargets;

#[derive(Debug)]
pub enum Action {
    Run {
        port: u16,
        listen: Option<String>,
        config: CollectorConfig,
        targets: StaticTargets,
    },
}
