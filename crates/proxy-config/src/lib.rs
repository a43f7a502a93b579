//! # Proxy Config
//!
//! Configuration for the LLM API proxy.
//!
//! Settings are resolved in three layers: built-in defaults, an optional TOML
//! file (`PROXY_CONFIG` env var, else `proxy.toml` in the working directory),
//! then environment variable overrides. Validation runs once at startup and
//! aborts the process on unusable configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod loader;
pub mod settings;

pub use loader::load_config;
pub use settings::{
    AdmissionConfig, BackendConfig, DatabaseConfig, LoggingConfig, ProxyConfig, ServerConfig,
};
