use crate::cli::actions::Action;
use crate::exporter;
use anyhow::Result;
use tracing::debug;

/// Run the exporter until a shutdown signal arrives.
pub async fn handle(action: Action) -> Result<()> {
    let Action::Run {
        port,
        listen,
        config,
        targets,
    } = action;

    debug!(port, ?listen, targets = targets.len(), "starting exporter");

    exporter::new(port, listen, config, targets).await
}
