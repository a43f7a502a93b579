//! # Proxy Core
//!
//! Core types for the LLM API proxy.
//!
//! This crate provides the foundational pieces shared by the proxy pipeline:
//! - The error taxonomy surfaced by every stage
//! - Usage figures and their extraction from backend responses
//! - Incremental inspection of framed event streams
//! - A parsed view over a caller's completion request body

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod request;
pub mod streaming;
pub mod usage;

// Re-export commonly used types
pub use error::ProxyError;
pub use request::CompletionPayload;
pub use streaming::StreamInspector;
pub use usage::{extract_usage, UsageFigure};
