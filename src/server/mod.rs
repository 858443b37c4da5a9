//! Server bootstrap.
//!
//! gRPC and the REST gateway share one listener. [`multiplex::GrpcMultiplexer`] picks the
//! backend per request and [`transport::Transport`] decides between TLS and plaintext h2c.

pub mod multiplex;
pub mod transport;

use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use axum_server::Handle;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::ServerConfig,
    handlers::{
        grpc,
        rest::{self, AppState, SwaggerDocument},
    },
    observability::{logging, metrics, spans},
    service::MailService,
};

use multiplex::GrpcMultiplexer;
use transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address '{address}': {source}")]
    Address {
        address: String,
        source: std::io::Error,
    },

    #[error("Listen address '{0}' did not resolve")]
    Unresolved(String),

    #[error(
        "Unable to create x509 key pair from '{}' and '{}': {source}",
        .cert_file.display(),
        .key_file.display()
    )]
    Tls {
        cert_file: PathBuf,
        key_file: PathBuf,
        source: std::io::Error,
    },

    #[error("Unable to render swagger.json: {0}")]
    Swagger(#[from] serde_json::Error),

    #[error("Server on {addr} failed: {source}")]
    Serve {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Router for the JSON gateway, the OpenAPI document, metrics and Swagger UI.
pub fn http_router(state: AppState) -> Router {
    Router::new()
        .route("/v1alpha1/email", post(rest::send_mail))
        .route("/swagger.json", get(rest::swagger_json))
        .route("/metrics", get(rest::metrics))
        .merge(
            SwaggerUi::new("/swagger-ui")
                .config(utoipa_swagger_ui::Config::new(["/swagger.json"])),
        )
        .layer(from_fn(metrics::track_http))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
}

/// Router wrapping the tonic service; every path is handed to it.
pub fn grpc_router(service: Arc<MailService>) -> Router {
    Router::new()
        .fallback_service(grpc::create_grpc_server(service))
        .layer(from_fn(metrics::track_grpc))
        .layer(
            TraceLayer::new_for_grpc()
                .make_span_with(spans::grpc_span)
                .on_response(spans::on_grpc_response)
                .on_eos(spans::on_grpc_eos),
        )
        .layer(CatchPanicLayer::new())
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ServerError> {
    let address = format!("{host}:{port}");
    let lookup = tokio::net::lookup_host(address.clone()).await;
    let mut addrs = match lookup {
        Ok(addrs) => addrs,
        Err(source) => return Err(ServerError::Address { address, source }),
    };
    addrs.next().ok_or(ServerError::Unresolved(address))
}

/// A fully configured server, ready to [`serve`](Server::serve).
pub struct Server {
    addr: SocketAddr,
    app: GrpcMultiplexer,
    transport: Transport,
    handle: Handle<SocketAddr>,
}

impl Server {
    /// Builds the routers and loads the transport.
    ///
    /// # Errors
    ///
    /// Fails when the listen address does not resolve or, with `secure` set, when the
    /// certificate or key cannot be loaded. No server is returned in that case.
    pub async fn build(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = resolve(&config.host, config.port).await?;
        let transport = Transport::from_config(config).await?;

        let mail = Arc::new(MailService::new());
        let state = AppState {
            mail: mail.clone(),
            metrics: metrics::install(),
            swagger: SwaggerDocument::render()?,
        };

        let app = GrpcMultiplexer::new(grpc_router(mail), http_router(state));

        Ok(Self {
            addr,
            app,
            transport,
            handle: Handle::new(),
        })
    }

    /// Handle for address discovery and shutdown.
    pub fn handle(&self) -> Handle<SocketAddr> {
        self.handle.clone()
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub const fn is_secure(&self) -> bool {
        self.transport.is_secure()
    }

    /// Binds the listener and serves until the handle is shut down.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Serve`] when the address cannot be bound or the accept
    /// loop fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr = self.addr;
        tracing::info!(
            version = logging::VERSION,
            commit = logging::COMMIT,
            secure = self.transport.is_secure(),
            "gRPC and REST server starting, listening on {}",
            addr
        );

        self.transport
            .serve(addr, self.handle, self.app)
            .await
            .map_err(|source| ServerError::Serve { addr, source })
    }
}

/// Waits for Ctrl-C or SIGTERM, then drains connections for at most `grace`.
pub async fn shutdown_signal(handle: Handle<SocketAddr>, grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections for up to {:?}", grace);
    handle.graceful_shutdown(Some(grace));
}
