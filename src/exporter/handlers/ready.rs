use crate::metrics::MetricsHub;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::debug;

#[derive(Serialize, Debug)]
pub struct Readiness {
    ready: bool,
    collectors: usize,
    /// Collectors that have not published a snapshot yet.
    pending: Vec<String>,
}

/// 200 once every collector has published at least once, 503 before.
pub async fn ready(Extension(hub): Extension<MetricsHub>) -> impl IntoResponse {
    let engines = hub.engines();
    let pending = engines.pending();

    let readiness = Readiness {
        ready: pending.is_empty(),
        collectors: engines.len(),
        pending,
    };

    let status = if readiness.ready {
        StatusCode::OK
    } else {
        debug!(pending = ?readiness.pending, "not ready");
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(readiness))
}
