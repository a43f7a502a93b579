//! User accounts and API key issuance.

use chrono::{DateTime, Utc};
use proxy_core::ProxyError;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sqlx::FromRow;
use tracing::info;

use crate::store::LedgerStore;

/// Length in bytes of the random portion of an API key.
const KEY_BYTES: usize = 32;

/// Prefix carried by every issued API key.
const KEY_PREFIX: &str = "llmp-";

/// A registered caller of the proxy.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    /// Row id, used as the foreign key in the usage ledger.
    pub id: i64,
    /// Unique human-chosen name.
    pub username: String,
    /// Bearer credential presented on every proxied request.
    pub api_key: String,
    /// Disabled users keep their history but are refused at the gate.
    pub is_active: bool,
    /// Issuance time.
    pub created_at: DateTime<Utc>,
}

/// Generate a fresh `llmp-` key from 32 bytes of OS randomness.
fn generate_api_key() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{KEY_PREFIX}{}", hex::encode(bytes))
}

impl LedgerStore {
    /// Register `username` and issue it a fresh API key.
    ///
    /// Usernames are unique; re-registering an existing one fails with an
    /// invalid-argument error rather than rotating the key.
    pub async fn create_user(&self, username: &str) -> Result<User, ProxyError> {
        let api_key = generate_api_key();
        let created_at = Utc::now();

        let result = sqlx::query(
            "INSERT INTO users (username, api_key, is_active, created_at) VALUES (?, ?, 1, ?)",
        )
        .bind(username)
        .bind(&api_key)
        .bind(created_at)
        .execute(self.pool())
        .await;

        let inserted = match result {
            Ok(done) => done,
            Err(err) if is_unique_violation(&err) => {
                return Err(ProxyError::invalid_argument(format!(
                    "User '{username}' already exists"
                )));
            }
            Err(err) => return Err(ProxyError::persistence(err)),
        };

        info!(username, "Issued new API key");
        Ok(User {
            id: inserted.last_insert_rowid(),
            username: username.to_owned(),
            api_key,
            is_active: true,
            created_at,
        })
    }

    /// Look up a user by the full API key string.
    pub async fn find_user_by_key(&self, api_key: &str) -> Result<Option<User>, ProxyError> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, api_key, is_active, created_at FROM users WHERE api_key = ?",
        )
        .bind(api_key)
        .fetch_optional(self.pool())
        .await
        .map_err(ProxyError::persistence)
    }

    /// Look up a user by name.
    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ProxyError> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, api_key, is_active, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await
        .map_err(ProxyError::persistence)
    }

    /// Every registered user, newest first.
    pub async fn list_users(&self) -> Result<Vec<User>, ProxyError> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, api_key, is_active, created_at FROM users \
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(ProxyError::persistence)
    }

    /// Mark a user inactive. Their ledger rows are untouched.
    pub async fn disable_user(&self, id: i64) -> Result<(), ProxyError> {
        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(ProxyError::persistence)?;
        info!(user_id = id, "Disabled API key");
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
