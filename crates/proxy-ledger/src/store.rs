//! SQLite-backed ledger store.

use std::str::FromStr;
use std::time::Duration;

use proxy_core::ProxyError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

use crate::schema;

/// Handle to the proxy's durable state: users, usage ledger, error log.
///
/// Cloning is cheap (shared pool). One store serves both the request path
/// (key lookup, usage append) and the admin path (listing, aggregation).
#[derive(Debug, Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    /// Open the database at `url`, creating the file if needed, and apply
    /// the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, ProxyError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|err| {
                ProxyError::configuration(format!("Invalid database URL {url}: {err}"))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(ProxyError::persistence)?;

        let store = Self { pool };
        store.provision().await?;
        info!(url, "Ledger store ready");
        Ok(store)
    }

    /// Open a private in-memory database on a single connection. Used by
    /// tests and local experiments; data lives as long as the store.
    pub async fn in_memory() -> Result<Self, ProxyError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(ProxyError::persistence)?
            .foreign_keys(true);

        // Single pinned connection: each new in-memory connection would be
        // a fresh empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(ProxyError::persistence)?;

        let store = Self { pool };
        store.provision().await?;
        Ok(store)
    }

    /// Apply the idempotent schema statements.
    async fn provision(&self) -> Result<(), ProxyError> {
        for statement in schema::statements() {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(ProxyError::persistence)?;
        }
        debug!("Ledger schema provisioned");
        Ok(())
    }

    /// Checkpoint the WAL and close the pool. Called on graceful shutdown.
    pub async fn close(&self) {
        if let Err(err) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
        {
            warn!(error = %err, "WAL checkpoint failed during shutdown");
        }
        self.pool.close().await;
        info!("Ledger store closed");
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
