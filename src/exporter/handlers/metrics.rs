use crate::metrics::MetricsHub;
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, error};

/// Render the last published snapshot of every collector. Never triggers a
/// collection.
pub async fn metrics(Extension(hub): Extension<MetricsHub>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );

    match hub.render() {
        Ok(metrics) => {
            debug!(bytes = metrics.len(), "rendered metrics");
            (StatusCode::OK, headers, metrics)
        }
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                format!("Error rendering metrics: {e}"),
            )
        }
    }
}
