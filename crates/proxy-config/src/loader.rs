//! Configuration resolution: defaults, optional TOML file, env overrides.

use std::env;
use std::fs;
use std::path::PathBuf;

use proxy_core::ProxyError;
use secrecy::SecretString;
use tracing::info;

use crate::settings::ProxyConfig;

/// File consulted when `PROXY_CONFIG` is not set.
const DEFAULT_CONFIG_FILE: &str = "proxy.toml";

/// Load, override, and validate the proxy configuration.
///
/// An explicit `PROXY_CONFIG` path must exist; the implicit `proxy.toml` is
/// optional. Environment overrides are applied after the file so deployments
/// can keep secrets out of it.
pub fn load_config() -> Result<ProxyConfig, ProxyError> {
    let mut config = match config_file_path()? {
        Some(path) => {
            let raw = fs::read_to_string(&path).map_err(|err| {
                ProxyError::configuration(format!("Failed to read {}: {err}", path.display()))
            })?;
            let config = toml::from_str(&raw).map_err(|err| {
                ProxyError::configuration(format!("Failed to parse {}: {err}", path.display()))
            })?;
            info!(path = %path.display(), "Configuration file loaded");
            config
        }
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn config_file_path() -> Result<Option<PathBuf>, ProxyError> {
    if let Ok(explicit) = env::var("PROXY_CONFIG") {
        let path = PathBuf::from(explicit);
        if !path.exists() {
            return Err(ProxyError::configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path));
    }
    let implicit = PathBuf::from(DEFAULT_CONFIG_FILE);
    Ok(implicit.exists().then_some(implicit))
}

fn apply_env_overrides(config: &mut ProxyConfig) -> Result<(), ProxyError> {
    if let Ok(host) = env::var("PROXY_HOST") {
        config.server.host = host;
    }
    if let Ok(port) = env::var("PROXY_PORT") {
        config.server.port = port.parse().map_err(|_| {
            ProxyError::configuration(format!("PROXY_PORT is not a valid port: {port}"))
        })?;
    }
    if let Ok(url) = env::var("PROXY_BACKEND_URL") {
        config.backend.url = url;
    }
    if let Ok(key) = env::var("PROXY_BACKEND_API_KEY") {
        config.backend.api_key = SecretString::new(key);
    }
    if let Ok(url) = env::var("PROXY_DATABASE_URL") {
        config.database.url = url;
    }
    if let Ok(limit) = env::var("PROXY_MAX_CONCURRENT_REQUESTS") {
        config.admission.max_concurrent_requests = limit.parse().map_err(|_| {
            ProxyError::configuration(format!(
                "PROXY_MAX_CONCURRENT_REQUESTS is not a valid count: {limit}"
            ))
        })?;
    }
    if let Ok(level) = env::var("PROXY_LOG_LEVEL") {
        config.logging.level = level;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment mutation is process-wide, so every env case lives in this
    // one test to keep the suite parallel-safe.
    #[test]
    fn test_env_overrides() {
        env::set_var("PROXY_HOST", "127.0.0.1");
        env::set_var("PROXY_PORT", "9100");
        env::set_var("PROXY_BACKEND_URL", "https://backend.internal");
        env::set_var("PROXY_MAX_CONCURRENT_REQUESTS", "8");

        let mut config = ProxyConfig::default();
        apply_env_overrides(&mut config).expect("overrides apply");

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.backend.url, "https://backend.internal");
        assert_eq!(config.admission.max_concurrent_requests, 8);

        env::set_var("PROXY_PORT", "not-a-port");
        let err = apply_env_overrides(&mut config).expect_err("bad port");
        assert!(matches!(err, ProxyError::Configuration(_)));

        for var in [
            "PROXY_HOST",
            "PROXY_PORT",
            "PROXY_BACKEND_URL",
            "PROXY_MAX_CONCURRENT_REQUESTS",
        ] {
            env::remove_var(var);
        }
    }
}
