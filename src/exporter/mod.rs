use crate::{
    cli::telemetry::shutdown_tracer,
    collectors::{config::CollectorConfig, registry::CollectorRegistry},
    metrics::MetricsHub,
    portscan::StaticTargets,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    http::{HeaderName, HeaderValue},
    middleware::from_fn,
    routing::get,
};
use std::{net::IpAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};
use ulid::Ulid;

mod handlers;
mod middleware;
mod shutdown;

const REQUEST_ID: &str = "x-request-id";

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = if let Some(hash) = built_info::GIT_COMMIT_HASH {
    hash
} else {
    ":-("
};

/// Start the collectors and serve `/metrics`, `/healthz` and `/readyz` until
/// SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if a collector cannot be set up or the listener cannot
/// be bound.
pub async fn new(
    port: u16,
    listen: Option<String>,
    config: CollectorConfig,
    targets: StaticTargets,
) -> Result<()> {
    let hub = MetricsHub::new();
    let registry = CollectorRegistry::new(config);

    if registry.is_empty() {
        warn!("No collectors enabled, /metrics will be empty");
    }

    let target_count = targets.len();
    let handles = registry.start(&hub, Arc::new(targets))?;

    let app = router(hub);

    let (listener, bind_addr) = bind(listen.as_deref(), port).await?;

    println!(
        "{} {} - Listening on {bind_addr}\n\nEnabled collectors:\n{}\n\nTargets: {target_count}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        format_list(&registry.collector_names()),
    );

    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown::shutdown_signal_handler())
        .await
    {
        error!(error=%e, "server error");
    }

    info!("shutting down");

    for handle in handles {
        handle.abort();
    }

    shutdown_tracer();

    Ok(())
}

/// HTTP routes and middleware over a shared [`MetricsHub`].
pub fn router(hub: MetricsHub) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(middleware::make_span)
        .on_response(middleware::on_response);

    Router::new()
        .route("/metrics", get(handlers::metrics))
        .route("/healthz", get(handlers::health).options(handlers::health))
        .route("/readyz", get(handlers::ready))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(&Ulid::new().to_string()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(trace_layer)
                .layer(from_fn(middleware::add_trace_headers))
                .layer(Extension(hub)),
        )
}

/// Bind `listen:port`, or `[::]:port` falling back to `0.0.0.0:port` when no
/// address is given. Returns the listener and a printable address.
///
/// # Errors
///
/// Returns an error if `listen` is not an IP address or binding fails.
pub async fn bind(listen: Option<&str>, port: u16) -> Result<(TcpListener, String)> {
    if let Some(addr) = listen {
        let ip = addr.parse::<IpAddr>().map_err(|_| {
            anyhow!(
                "Invalid IP address: '{addr}'. Expected IPv4 (e.g., 0.0.0.0, 127.0.0.1) or IPv6 (e.g., ::, ::1)"
            )
        })?;

        let display = if ip.is_ipv6() {
            format!("[{ip}]:{port}")
        } else {
            format!("{ip}:{port}")
        };

        let listener = TcpListener::bind((ip, port))
            .await
            .with_context(|| format!("Failed to bind to {display}"))?;

        return Ok((listener, display));
    }

    // Auto: try IPv6 first, fallback to IPv4
    match TcpListener::bind(format!("[::]:{port}")).await {
        Ok(listener) => Ok((listener, format!("[::]:{port}"))),
        Err(_) => Ok((
            TcpListener::bind(format!("0.0.0.0:{port}"))
                .await
                .with_context(|| format!("Failed to bind to 0.0.0.0:{port}"))?,
            format!("0.0.0.0:{port}"),
        )),
    }
}

// "  - item" per line, for the startup message
fn format_list<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| format!("  - {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_exists() {
        // either a git hash or the ":-(" fallback
        let is_hex = GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit());
        let is_fallback = GIT_COMMIT_HASH == ":-(";

        assert!(
            is_hex || is_fallback,
            "Git commit hash should be hex digits or the fallback ':-(' pattern"
        );
    }

    #[test]
    fn test_format_list() {
        let empty: Vec<String> = vec![];
        assert_eq!(format_list(&empty), "");
        assert_eq!(format_list(&["inventory"]), "  - inventory");
        assert_eq!(
            format_list(&["inventory", "portscan", "exporter"]),
            "  - inventory\n  - portscan\n  - exporter"
        );
    }

    #[tokio::test]
    async fn test_bind_explicit_address() {
        let (listener, display) = bind(Some("127.0.0.1"), 0).await.unwrap();
        assert_eq!(display, "127.0.0.1:0");
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_rejects_hostnames() {
        let err = bind(Some("localhost"), 0).await.unwrap_err();
        assert!(err.to_string().contains("Invalid IP address"));
    }
}
