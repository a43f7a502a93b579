//! Shared application state for the HTTP layer.

use std::sync::Arc;

use proxy_admission::AdmissionGate;
use proxy_config::ProxyConfig;
use proxy_core::ProxyError;
use proxy_ledger::LedgerStore;

use crate::forwarder::Forwarder;

/// State threaded through every handler.
///
/// Cloning is cheap; the gate and forwarder are shared so every in-flight
/// request draws from the same slot pool and connection pool.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<ProxyConfig>,
    /// Durable users, ledger, and error log.
    pub ledger: LedgerStore,
    /// Concurrency gate applied ahead of every backend call.
    pub gate: Arc<AdmissionGate>,
    /// Backend HTTP client.
    pub forwarder: Arc<Forwarder>,
}

impl AppState {
    /// Assemble state from loaded configuration and an opened store.
    pub fn new(config: ProxyConfig, ledger: LedgerStore) -> Result<Self, ProxyError> {
        let forwarder = Forwarder::new(&config.backend)?;

        let mut gate = AdmissionGate::new(config.admission.max_concurrent_requests);
        if let Some(timeout) = config.admission.queue_timeout {
            gate = gate.with_queue_timeout(timeout);
        }

        Ok(Self {
            config: Arc::new(config),
            ledger,
            gate: Arc::new(gate),
            forwarder: Arc::new(forwarder),
        })
    }
}
