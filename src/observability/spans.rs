//! Per-call spans for the gRPC router.
//!
//! Each RPC gets a `grpc` span carrying `grpc.service`, `grpc.method` and, once the
//! status is known, `grpc.code`. Incoming W3C trace context (`traceparent`,
//! `tracestate`) becomes the span's parent so exported traces join the caller's.

use std::time::Duration;

use axum::{extract::Request, http::HeaderMap, response::Response};
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing::{Span, field};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::metrics::{GRPC_STATUS_HEADER, grpc_code, split_grpc_path};

/// Reads trace context from HTTP/2 headers (gRPC metadata).
struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// `make_span_with` for the gRPC `TraceLayer`.
pub fn grpc_span(req: &Request) -> Span {
    let (service, method) = split_grpc_path(req.uri().path());

    let span = tracing::info_span!(
        "grpc",
        otel.kind = "server",
        rpc.system = "grpc",
        grpc.service = %service,
        grpc.method = %method,
        grpc.code = field::Empty,
    );

    let parent = TraceContextPropagator::new().extract(&HeaderExtractor(req.headers()));
    span.set_parent(parent);
    span
}

fn finish(code: &str, latency: Duration, span: &Span) {
    span.record("grpc.code", field::display(code));
    tracing::info!(
        parent: span,
        grpc.code = %code,
        grpc.time_ms = latency.as_secs_f64() * 1000.0,
        "finished call"
    );
}

/// `on_response` for the gRPC `TraceLayer`. Only trailers-only responses carry their
/// status here; everything else finishes in [`on_grpc_eos`].
pub fn on_grpc_response(response: &Response, latency: Duration, span: &Span) {
    if response.headers().contains_key(GRPC_STATUS_HEADER) {
        finish(&grpc_code(response.headers()), latency, span);
    }
}

/// `on_eos` for the gRPC `TraceLayer`: reads the status from the trailers.
pub fn on_grpc_eos(trailers: Option<&HeaderMap>, stream_duration: Duration, span: &Span) {
    let code = trailers.map_or_else(|| "Ok".to_string(), grpc_code);
    finish(&code, stream_duration, span);
}
