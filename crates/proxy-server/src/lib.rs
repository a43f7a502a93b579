//! # Proxy Server
//!
//! HTTP surface of the LLM API proxy.
//!
//! This crate provides:
//! - Axum-based OpenAI-compatible proxy endpoints (`/v1/*`)
//! - API key authentication middleware backed by the ledger store
//! - Bounded-concurrency admission ahead of every backend call
//! - Batch and streaming relays that extract token usage while forwarding
//! - Admin endpoints for key issuance and windowed cost reports
//! - Graceful shutdown handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admin;
pub mod auth;
pub mod error;
pub mod extractors;
pub mod forwarder;
pub mod handlers;
pub mod relay;
pub mod routes;
pub mod shutdown;
pub mod state;

pub use error::ApiError;
pub use forwarder::Forwarder;
pub use routes::create_router;
pub use shutdown::shutdown_signal;
pub use state::AppState;
