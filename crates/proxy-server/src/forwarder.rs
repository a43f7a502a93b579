//! HTTP client for the completion backend.

use proxy_config::BackendConfig;
use proxy_core::ProxyError;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

/// Client for the OpenAI-compatible backend.
///
/// The caller's credential never reaches the backend; every forwarded
/// request carries the configured backend key instead.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl Forwarder {
    /// Build a client from backend settings.
    pub fn new(config: &BackendConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| {
                ProxyError::configuration(format!("Failed to build backend HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        })
    }

    /// POST a completion payload to `path` under the backend base URL.
    ///
    /// Transport failures surface as raw [`reqwest::Error`] so the caller
    /// can distinguish timeouts from connection errors when recording them.
    pub async fn completion(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "Forwarding completion request");
        self.client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
    }

    /// GET the backend's model catalog.
    pub async fn models(&self) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}/v1/models", self.base_url);
        self.client
            .get(&url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
    }
}

/// Error-log kind for a transport failure, before any response arrived.
pub fn transport_error_kind(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else {
        "request_error"
    }
}
