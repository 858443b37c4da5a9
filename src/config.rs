use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "EMAIL_BACKEND_CONFIG";

/// Prefix of the environment variables layered over the file, e.g. `EMAIL_BACKEND_PORT`.
pub const ENV_PREFIX: &str = "EMAIL_BACKEND";

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Shipped template, only used when nothing else is found.
pub const EXAMPLE_CONFIG_FILE: &str = "config.example.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file '{0}' not found")]
    NotFound(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Top-level settings. Server and tracing keys live at the root of the file so the
/// environment names stay flat (`EMAIL_BACKEND_PORT`, `EMAIL_BACKEND_OTLP_ENDPOINT`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub server: ServerConfig,
    #[serde(flatten)]
    pub tracing: TracingConfig,
    /// Turn on debug logging
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Terminate TLS on the listener; plaintext h2c otherwise
    pub secure: bool,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    #[serde(with = "humantime_serde")]
    pub shutdown_grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9091,
            secure: true,
            cert_file: PathBuf::from("certs/server.pem"),
            key_file: PathBuf::from("certs/server.key"),
            shutdown_grace_period: Duration::from_secs(10),
        }
    }
}

/// Span export. Nothing leaves the process unless `otlp_endpoint` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// OTLP/gRPC collector, e.g. `http://localhost:4317`
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: "email-backend".to_string(),
        }
    }
}

/// Picks the configuration file.
///
/// An explicit path must exist. Without one, `$EMAIL_BACKEND_CONFIG`, `config.yaml` and
/// `config.example.yaml` are tried in order. `None` means defaults plus environment.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] when the explicit path does not exist.
pub fn resolve_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let candidates = env::var(CONFIG_PATH_ENV)
        .ok()
        .into_iter()
        .chain([DEFAULT_CONFIG_FILE.to_string(), EXAMPLE_CONFIG_FILE.to_string()]);

    Ok(candidates.map(PathBuf::from).find(|path| path.exists()))
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).try_parsing(true)
}

fn build(file: Option<&Path>, env: Environment) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = file {
        builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
    }

    let config = builder.add_source(env).build()?;
    Ok(config.try_deserialize()?)
}

/// Loads `file` (if any) over the defaults, then `EMAIL_BACKEND_*` variables on top.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, or when a value has the
/// wrong type.
pub fn load_config(file: Option<&Path>) -> Result<Config, ConfigError> {
    build(file, environment())
}
