//! Prometheus metrics.
//!
//! # Metrics
//! - `http_requests_total` (counter): REST/static requests by method, route, status
//! - `http_request_duration_seconds` (histogram): REST/static latency
//! - `grpc_server_started_total` (counter): RPCs started
//! - `grpc_server_handled_total` (counter): RPCs completed, by gRPC status code
//! - `grpc_server_handling_seconds` (histogram): RPC latency
//!
//! The recorder is process-wide; [`install`] sets it up on first use and hands out
//! the same [`PrometheusHandle`] afterwards.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Header carrying the status of a trailers-only gRPC response.
pub(crate) const GRPC_STATUS_HEADER: &str = "grpc-status";

/// Installs the Prometheus recorder (once per process) and returns its handle.
pub fn install() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();

            if let Err(e) = metrics::set_global_recorder(recorder) {
                tracing::warn!("Metrics recorder already installed, /metrics will be empty: {e}");
            }
            describe();

            handle
        })
        .clone()
}

fn describe() {
    describe_counter!(
        "http_requests_total",
        "Total number of HTTP requests served by the REST gateway and static routes."
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "Latency of HTTP requests served by the REST gateway and static routes."
    );
    describe_counter!(
        "grpc_server_started_total",
        "Total number of RPCs started on the server."
    );
    describe_counter!(
        "grpc_server_handled_total",
        "Total number of RPCs completed on the server, regardless of success or failure."
    );
    describe_histogram!(
        "grpc_server_handling_seconds",
        Unit::Seconds,
        "Latency of RPCs handled by the server."
    );
}

/// Records `http_requests_total` and `http_request_duration_seconds`.
pub async fn track_http(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());

    response
}

/// Splits `/package.Service/Method` into service and method names.
pub(crate) fn split_grpc_path(path: &str) -> (String, String) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((service, method)) => (service.to_string(), method.to_string()),
        None => ("unknown".to_string(), trimmed.to_string()),
    }
}

/// Maps a `grpc-status` entry (trailers-only headers or trailers) to a code name.
/// A missing entry is reported as `Ok`.
pub(crate) fn grpc_code(headers: &HeaderMap) -> String {
    let code = headers
        .get(GRPC_STATUS_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i32>().ok())
        .map_or(tonic::Code::Ok, tonic::Code::from_i32);

    format!("{code:?}")
}

/// Records the `grpc_server_*` family for unary RPCs.
pub async fn track_grpc(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let (service, method) = split_grpc_path(req.uri().path());

    let labels = [
        ("grpc_type", "unary".to_string()),
        ("grpc_service", service),
        ("grpc_method", method),
    ];
    counter!("grpc_server_started_total", &labels).increment(1);

    let response = next.run(req).await;

    let [grpc_type, grpc_service, grpc_method] = labels.clone();
    let handled = [
        grpc_type,
        grpc_service,
        grpc_method,
        ("grpc_code", grpc_code(response.headers())),
    ];
    counter!("grpc_server_handled_total", &handled).increment(1);
    histogram!("grpc_server_handling_seconds", &labels).record(start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn splits_full_method_name() {
        let (service, method) = split_grpc_path("/email.v1alpha1.EmailService/SendMail");
        assert_eq!(service, "email.v1alpha1.EmailService");
        assert_eq!(method, "SendMail");
    }

    #[test]
    fn malformed_path_has_unknown_service() {
        let (service, method) = split_grpc_path("/SendMail");
        assert_eq!(service, "unknown");
        assert_eq!(method, "SendMail");
    }

    #[test]
    fn trailers_only_status_is_reported() {
        let response = Response::builder()
            .header(GRPC_STATUS_HEADER, "12")
            .body(Body::empty())
            .unwrap();
        assert_eq!(grpc_code(response.headers()), "Unimplemented");
    }

    #[test]
    fn missing_status_header_means_ok() {
        let response = Response::new(Body::empty());
        assert_eq!(grpc_code(response.headers()), "Ok");
    }

    #[test]
    fn install_returns_shared_handle() {
        let _first = install();
        counter!("grpc_server_started_total", "grpc_service" => "install_test").increment(1);
        let second = install();
        assert!(second.render().contains("install_test"));
    }
}
