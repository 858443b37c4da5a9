//! Shared setup for the integration tests: spawns a server on an ephemeral port.

#![allow(dead_code)]

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use axum_server::Handle;
use email_backend::{
    client::{ClientConfig, MailClient},
    config::ServerConfig,
    server::Server,
};

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

pub fn server_config(secure: bool) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        secure,
        cert_file: fixture("server.pem"),
        key_file: fixture("server.key"),
        shutdown_grace_period: Duration::from_secs(1),
    }
}

/// A running server, shut down when dropped.
pub struct TestApp {
    pub addr: SocketAddr,
    pub secure: bool,
    handle: Handle<SocketAddr>,
}

impl TestApp {
    pub async fn spawn(secure: bool) -> Self {
        let server = Server::build(&server_config(secure))
            .await
            .expect("Failed to build server");
        let handle = server.handle();

        tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                eprintln!("test server failed: {e}");
            }
        });

        let addr = handle
            .listening()
            .await
            .expect("Server stopped before listening");

        Self {
            addr,
            secure,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        if self.secure {
            format!("https://localhost:{}{path}", self.addr.port())
        } else {
            format!("http://{}{path}", self.addr)
        }
    }

    /// HTTP/1.1 client; over TLS it trusts the fixture certificate.
    pub fn http1(&self) -> reqwest::Client {
        self.builder()
            .http1_only()
            .build()
            .expect("Failed to build client")
    }

    /// HTTP/2 client. Negotiated through ALPN over TLS, prior knowledge (h2c) otherwise.
    pub fn http2(&self) -> reqwest::Client {
        let builder = self.builder();
        let builder = if self.secure {
            builder
        } else {
            builder.http2_prior_knowledge()
        };
        builder.build().expect("Failed to build client")
    }

    fn builder(&self) -> reqwest::ClientBuilder {
        let builder = reqwest::Client::builder().timeout(Duration::from_secs(10));
        if !self.secure {
            return builder;
        }

        let pem = std::fs::read(fixture("server.pem")).expect("Failed to read fixture");
        let cert = reqwest::Certificate::from_pem(&pem).expect("Invalid fixture certificate");
        builder
            .use_rustls_tls()
            .add_root_certificate(cert)
            .resolve("localhost", self.addr)
    }

    pub async fn grpc_client(&self) -> MailClient {
        let config = if self.secure {
            ClientConfig {
                address: format!("https://{}", self.addr),
                ca_file: Some(fixture("server.pem")),
                server_name: Some("localhost".to_string()),
            }
        } else {
            ClientConfig {
                address: format!("http://{}", self.addr),
                ca_file: None,
                server_name: None,
            }
        };

        MailClient::connect(config)
            .await
            .expect("Failed to connect gRPC client")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}
