//! Configuration schema and defaults.

use std::collections::HashMap;
use std::time::Duration;

use proxy_core::ProxyError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

/// Top-level proxy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listen address settings.
    pub server: ServerConfig,
    /// Upstream completion backend settings.
    pub backend: BackendConfig,
    /// Ledger database settings.
    pub database: DatabaseConfig,
    /// Concurrency admission settings.
    pub admission: AdmissionConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// Optional requested-name to backend-name model rewrites.
    pub model_map: HashMap<String, String>,
}

impl ProxyConfig {
    /// Resolve a requested model name through the configured map.
    /// Unmapped names pass through unchanged.
    pub fn map_model<'a>(&'a self, requested: &'a str) -> &'a str {
        self.model_map
            .get(requested)
            .map_or(requested, String::as_str)
    }

    /// Reject configurations the proxy cannot run with.
    pub fn validate(&self) -> Result<(), ProxyError> {
        Url::parse(&self.backend.url).map_err(|err| {
            ProxyError::configuration(format!("backend.url is not a valid URL: {err}"))
        })?;
        if self.backend.api_key.expose_secret().is_empty() {
            return Err(ProxyError::configuration(
                "backend.api_key must be set (or PROXY_BACKEND_API_KEY exported)",
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ProxyError::configuration(
                "database.max_connections must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Listen address settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8000,
        }
    }
}

/// Upstream completion backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the OpenAI-compatible backend.
    pub url: String,
    /// Credential substituted for the caller's key on every forwarded
    /// request. Never logged.
    pub api_key: SecretString,
    /// Overall deadline for one backend request, including streaming reads.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Deadline for establishing the backend connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com".to_owned(),
            api_key: SecretString::new(String::new()),
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Ledger database settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://llm_proxy.db".to_owned(),
            max_connections: 5,
        }
    }
}

/// Concurrency admission settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum concurrently forwarded requests (0 = unlimited).
    pub max_concurrent_requests: usize,
    /// Optional bound on how long a request may wait for a slot before the
    /// proxy answers 503. Absent means wait indefinitely.
    #[serde(default, with = "humantime_serde")]
    pub queue_timeout: Option<Duration>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 500,
            queue_timeout: None,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}
