//! Structured logging and span export.
//!
//! `RUST_LOG` takes precedence; otherwise the level follows the debug flag. When an
//! OTLP endpoint is configured, spans are also exported through OpenTelemetry.

use opentelemetry::{KeyValue, trace::TraceError};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, propagation::TraceContextPropagator, runtime, trace as sdktrace};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::TracingConfig;

/// Crate version, recorded on startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commit the binary was built from, provided through `GIT_COMMIT` at build time.
pub const COMMIT: &str = match option_env!("GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "email_backend=debug,tower_http=debug,info"
    } else {
        "info"
    }
}

fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(debug)))
}

fn otlp_tracer(endpoint: &str, service_name: &str) -> Result<sdktrace::Tracer, TraceError> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint);

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", service_name.to_string()),
            KeyValue::new("service.version", VERSION),
        ])))
        .install_batch(runtime::Tokio)
}

/// Flushes exported spans when dropped.
#[must_use = "dropping the guard stops span export"]
#[derive(Debug)]
pub struct Telemetry {
    exporting: bool,
}

impl Telemetry {
    pub const fn is_exporting(&self) -> bool {
        self.exporting
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if self.exporting {
            opentelemetry::global::shutdown_tracer_provider();
        }
    }
}

/// Installs the global subscriber. Calling it twice is a no-op.
///
/// Must run inside a Tokio runtime when `export.otlp_endpoint` is set.
pub fn init(debug: bool, export: &TracingConfig) -> Telemetry {
    let (tracer, export_error) = match export.otlp_endpoint.as_deref() {
        Some(endpoint) => match otlp_tracer(endpoint, &export.service_name) {
            Ok(tracer) => (Some(tracer), None),
            Err(e) => (None, Some(e)),
        },
        None => (None, None),
    };

    let exporting = tracer.is_some();
    if exporting {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
    }

    let _ = tracing_subscriber::registry()
        .with(env_filter(debug))
        .with(tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer)))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if let Some(e) = export_error {
        tracing::warn!("OTLP export disabled, unable to set up the exporter: {e}");
    } else if let Some(endpoint) = export.otlp_endpoint.as_deref() {
        tracing::info!("Exporting spans to {endpoint}");
    }

    Telemetry { exporting }
}
