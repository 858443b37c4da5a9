//! gRPC client for the email service.

use std::path::PathBuf;

use tonic::{
    Request,
    transport::{Certificate, Channel, ClientTlsConfig, Endpoint},
};

use crate::handlers::grpc::email::{
    EmailRequest, EmailResponse, email_service_client::EmailServiceClient,
};
use crate::server::transport::install_crypto_provider;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid server address '{address}': {source}")]
    Uri {
        address: String,
        source: tonic::transport::Error,
    },

    #[error("Unable to read CA certificate '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to connect to the server: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("SendMail failed: {0}")]
    Status(#[from] tonic::Status),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URI, `https://` when `ca_file` is set
    pub address: String,
    /// Root certificate trusted for the server, enables TLS
    pub ca_file: Option<PathBuf>,
    /// Name checked against the server certificate instead of the address host
    pub server_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "https://localhost:9091".to_string(),
            ca_file: Some(PathBuf::from("certs/server.pem")),
            server_name: None,
        }
    }
}

pub struct MailClient {
    inner: EmailServiceClient<Channel>,
}

impl MailClient {
    /// Connects to the server, over TLS when a CA file is configured.
    ///
    /// # Errors
    ///
    /// Fails on an invalid address, an unreadable CA file or a connection error.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let mut endpoint =
            Endpoint::from_shared(config.address.clone()).map_err(|source| ClientError::Uri {
                address: config.address.clone(),
                source,
            })?;

        if let Some(ca_file) = &config.ca_file {
            install_crypto_provider();

            let pem = tokio::fs::read(ca_file)
                .await
                .map_err(|source| ClientError::Io {
                    path: ca_file.clone(),
                    source,
                })?;

            let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem));
            if let Some(server_name) = &config.server_name {
                tls = tls.domain_name(server_name.clone());
            }
            endpoint = endpoint.tls_config(tls)?;
        }

        let channel = endpoint.connect().await?;
        tracing::debug!("Connected to gRPC server at address {}", config.address);

        Ok(Self {
            inner: EmailServiceClient::new(channel),
        })
    }

    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns the RPC status when the call fails.
    pub async fn send_mail(
        &mut self,
        message: impl Into<String>,
    ) -> Result<EmailResponse, ClientError> {
        let request = Request::new(EmailRequest {
            message: message.into(),
        });
        let response = self.inner.send_mail(request).await?;
        Ok(response.into_inner())
    }
}
