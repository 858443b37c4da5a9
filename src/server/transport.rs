//! Listener transport: TLS with ALPN, or plaintext with HTTP/2 prior knowledge.

use std::net::SocketAddr;

use axum_server::{Handle, tls_rustls::RustlsConfig};
use tower::make::Shared;

use crate::config::ServerConfig;

use super::{ServerError, multiplex::GrpcMultiplexer};

/// Installs the process-wide rustls crypto provider. Later calls are no-ops.
pub fn install_crypto_provider() {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        tracing::trace!("rustls crypto provider already installed");
    }
}

pub enum Transport {
    /// HTTP/1.1 and h2c on the same plaintext socket.
    Plaintext,
    /// TLS advertising `h2` and `http/1.1` through ALPN.
    Tls(RustlsConfig),
}

impl Transport {
    /// Selects the transport from the `secure` switch, loading the key pair if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Tls`] when the certificate or key cannot be loaded.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        if !config.secure {
            tracing::warn!("TLS disabled, serving plaintext HTTP/1.1 and h2c");
            return Ok(Self::Plaintext);
        }

        install_crypto_provider();

        tracing::info!(
            "Loading TLS certificates from {} and {}",
            config.cert_file.display(),
            config.key_file.display()
        );
        let tls = RustlsConfig::from_pem_file(&config.cert_file, &config.key_file)
            .await
            .map_err(|source| ServerError::Tls {
                cert_file: config.cert_file.clone(),
                key_file: config.key_file.clone(),
                source,
            })?;

        Ok(Self::Tls(tls))
    }

    pub const fn is_secure(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    pub(crate) async fn serve(
        self,
        addr: SocketAddr,
        handle: Handle<SocketAddr>,
        app: GrpcMultiplexer,
    ) -> std::io::Result<()> {
        match self {
            Self::Tls(tls) => {
                axum_server::bind_rustls(addr, tls)
                    .handle(handle)
                    .serve(Shared::new(app))
                    .await
            }
            Self::Plaintext => {
                axum_server::bind(addr)
                    .handle(handle)
                    .serve(Shared::new(app))
                    .await
            }
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plaintext => f.write_str("Plaintext"),
            Self::Tls(_) => f.write_str("Tls"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(secure: bool, cert_file: &str, key_file: &str) -> ServerConfig {
        ServerConfig {
            secure,
            cert_file: PathBuf::from(cert_file),
            key_file: PathBuf::from(key_file),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn crypto_provider_install_is_idempotent() {
        install_crypto_provider();
        install_crypto_provider();
        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }

    #[tokio::test]
    async fn insecure_selects_plaintext_without_touching_files() {
        let transport = Transport::from_config(&config(false, "missing.pem", "missing.key"))
            .await
            .unwrap();
        assert!(!transport.is_secure());
    }

    #[tokio::test]
    async fn secure_with_missing_files_fails() {
        let err = Transport::from_config(&config(true, "missing.pem", "missing.key"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Tls { .. }));
        assert!(err.to_string().contains("missing.pem"));
    }

    #[tokio::test]
    async fn secure_with_valid_pair_selects_tls() {
        let dir = env!("CARGO_MANIFEST_DIR");
        let transport = Transport::from_config(&config(
            true,
            &format!("{dir}/tests/data/server.pem"),
            &format!("{dir}/tests/data/server.key"),
        ))
        .await
        .unwrap();
        assert!(transport.is_secure());
    }
}
