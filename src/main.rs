//! # LLM API Proxy
//!
//! Authenticating reverse proxy for an OpenAI-compatible completion backend
//! with per-user API keys, bounded backend concurrency, and a durable
//! token-usage ledger.
//!
//! ## Usage
//!
//! ```bash
//! # Start with the implicit proxy.toml (if present) plus env overrides
//! llm-api-proxy
//!
//! # Start with an explicit configuration file
//! PROXY_CONFIG=/etc/llm-proxy/proxy.toml llm-api-proxy
//!
//! # Point at a different backend without touching the file
//! PROXY_BACKEND_URL=https://llm.internal PROXY_BACKEND_API_KEY=sk-... llm-api-proxy
//! ```

use anyhow::Context;
use proxy_config::{load_config, LoggingConfig};
use proxy_ledger::LedgerStore;
use proxy_server::{create_router, shutdown_signal, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("llm-api-proxy: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = load_config()?;
    init_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %config.backend.url,
        limit = config.admission.max_concurrent_requests,
        "Starting LLM API proxy"
    );

    let ledger = LedgerStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to open the ledger database")?;

    let bind_address = (config.server.host.clone(), config.server.port);
    let state = AppState::new(config, ledger)?;
    let router = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .context("failed to bind the listen address")?;
    info!(address = %listener.local_addr()?, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
        })
        .await
        .context("server error")?;

    state.ledger.close().await;
    Ok(())
}

/// Build the subscriber from `RUST_LOG` when set, else the configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
