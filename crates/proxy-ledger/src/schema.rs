//! Database schema for the proxy ledger.
//!
//! Every statement is idempotent; the store applies them in order on every
//! startup.

/// Users table: one row per issued API key.
pub const CREATE_USERS: &str = r"
    -- API-key users; disabling a key flips is_active and keeps history
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        api_key TEXT NOT NULL UNIQUE,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );
";

/// Usage ledger: append-only, one row per accounted proxied request.
pub const CREATE_USAGE_LOGS: &str = r"
    -- Append-only usage ledger; rows are never updated or deleted
    CREATE TABLE IF NOT EXISTS usage_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        model TEXT NOT NULL,
        input_tokens INTEGER NOT NULL DEFAULT 0,
        output_tokens INTEGER NOT NULL DEFAULT 0,
        cached_tokens INTEGER NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL
    );
";

/// Error trace log: best-effort record of failed proxy cycles.
pub const CREATE_ERROR_LOGS: &str = r"
    -- Operator forensics for failed proxy cycles; nothing reads this on the
    -- request path
    CREATE TABLE IF NOT EXISTS error_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        model TEXT,
        error_kind TEXT NOT NULL,
        message TEXT NOT NULL,
        status_code INTEGER,
        timestamp TEXT NOT NULL
    );
";

/// Indexes backing key lookup and windowed cost queries.
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_users_api_key ON users(api_key);",
    "CREATE INDEX IF NOT EXISTS idx_usage_logs_user_timestamp ON usage_logs(user_id, timestamp);",
    "CREATE INDEX IF NOT EXISTS idx_usage_logs_timestamp ON usage_logs(timestamp);",
];

/// All DDL statements in application order.
#[must_use]
pub fn statements() -> Vec<&'static str> {
    let mut all = vec![CREATE_USERS, CREATE_USAGE_LOGS, CREATE_ERROR_LOGS];
    all.extend_from_slice(CREATE_INDEXES);
    all
}
