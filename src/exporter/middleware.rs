use super::REQUEST_ID;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request, Response},
    middleware::Next,
};
use opentelemetry::global;
use opentelemetry::trace::{TraceContextExt, TraceId};
use opentelemetry_http::HeaderExtractor;
use std::time::Duration;
use tracing::{Span, field::Empty, info, info_span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

fn header<'a>(headers: &'a HeaderMap, name: &str, default: &'a str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(default)
}

/// Server span per request, parented to the caller's trace context if the
/// request carries one.
pub fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let parent_cx = global::get_text_map_propagator(|prop| prop.extract(&HeaderExtractor(headers)));

    let span = info_span!(
        "http.server.request",
        otel.kind = "server",
        otel.status_code = Empty,
        http.method = request.method().as_str(),
        http.route = request.uri().path(),
        http.target = %request.uri(),
        http.scheme = request.uri().scheme_str().unwrap_or("http"),
        http.user_agent = header(headers, "user-agent", "unknown"),
        http.status_code = Empty,
        request_id = header(headers, REQUEST_ID, "none"),
    );

    let _ = span.set_parent(parent_cx);

    span
}

pub fn on_response<B>(response: &Response<B>, latency: Duration, span: &Span) {
    let status = response.status();

    span.record("http.status_code", status.as_u16());
    span.record(
        "otel.status_code",
        if status.is_server_error() { "ERROR" } else { "OK" },
    );

    let elapsed_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
    let trace_id = span.context().span().span_context().trace_id();

    if trace_id == TraceId::INVALID {
        info!(parent: span, status = status.as_u16(), elapsed_ms, "request completed");
    } else {
        info!(parent: span, status = status.as_u16(), elapsed_ms, trace_id = %trace_id, "request completed");
    }
}

/// Echo the trace id as `x-trace-id` when the request is traced.
pub async fn add_trace_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut res = next.run(req).await;

    let span_context = Span::current().context().span().span_context().clone();

    if span_context.is_valid()
        && let Ok(val) = HeaderValue::from_str(&span_context.trace_id().to_string())
    {
        res.headers_mut()
            .insert(HeaderName::from_static("x-trace-id"), val);
    }

    res
}
