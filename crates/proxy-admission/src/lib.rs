//! # Proxy Admission
//!
//! Bounded-concurrency admission control for the LLM API proxy.
//!
//! The gate caps how many requests may be forwarded to the backend at once.
//! Slots are granted in arrival order and released by RAII permit drop, so a
//! slot can never leak regardless of how the forwarding stage exits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod gate;

pub use gate::{AdmissionGate, AdmissionPermit};
