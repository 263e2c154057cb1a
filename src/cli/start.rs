use crate::cli::{actions::Action, commands, dispatch::handler, telemetry};
use crate::exporter::GIT_COMMIT_HASH;
use anyhow::Result;
use tracing::{Level, debug};

/// `-v` per step: info, debug, trace. Without `-v` only errors are logged
/// unless `RUST_LOG` says otherwise.
const fn verbosity(count: u8) -> Option<Level> {
    match count {
        0 => None,
        1 => Some(Level::INFO),
        2 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// Parse the command line, start logging and validate the configuration.
///
/// # Errors
///
/// Returns an error if telemetry initialization or validation fails
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(verbosity(matches.get_count("verbose")))?;

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        commit = GIT_COMMIT_HASH,
        "configuration loaded"
    );

    handler(&matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity() {
        let cases = [
            (0, None),
            (1, Some(Level::INFO)),
            (2, Some(Level::DEBUG)),
            (3, Some(Level::TRACE)),
            (4, Some(Level::TRACE)),
            (u8::MAX, Some(Level::TRACE)),
        ];

        for (count, expected) in cases {
            assert_eq!(verbosity(count), expected, "-v x{count}");
        }
    }
}
