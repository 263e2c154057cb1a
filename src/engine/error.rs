use crate::cache::CacheError;
use std::any::Any;
use thiserror::Error;
use tokio::task::JoinError;

/// Configuration problems detected while building an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid backoff ladder: {reason}")]
    InvalidBackoff { reason: String },

    #[error("collector {collector} failed to set up: {error:#}")]
    Setup {
        collector: String,
        error: anyhow::Error,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Failures that escape a whole pass. Every variant advances the backoff
/// ladder; failures scoped to one unit never become a `PassError`.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("failed to list units: {0:#}")]
    Units(anyhow::Error),

    #[error("collection failed: {0:#}")]
    Collect(anyhow::Error),

    #[error("pass panicked: {0}")]
    Panicked(String),

    #[error("aggregation failed: {0}")]
    Aggregation(String),
}

impl PassError {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Units(_) => "units",
            Self::Collect(_) => "collect",
            Self::Panicked(_) => "panic",
            Self::Aggregation(_) => "aggregation",
        }
    }

    pub(crate) fn from_join(err: JoinError) -> Self {
        match err.try_into_panic() {
            Ok(payload) => Self::Panicked(panic_message(payload.as_ref())),
            Err(err) => Self::Aggregation(err.to_string()),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_join_keeps_panic_message() {
        let joined = tokio::spawn(async {
            #[allow(clippy::panic)]
            {
                panic!("boom");
            }
        })
        .await;

        let err = joined.err().map(PassError::from_join);
        assert!(matches!(err, Some(PassError::Panicked(ref m)) if m == "boom"));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(PassError::Units(anyhow::anyhow!("x")).kind(), "units");
        assert_eq!(PassError::Panicked("x".into()).kind(), "panic");
        assert_eq!(
            PassError::Collect(anyhow::anyhow!("api down")).to_string(),
            "collection failed: api down"
        );
    }
}
