//! Append-only usage and error recording.

use chrono::{DateTime, Utc};
use proxy_core::{ProxyError, UsageFigure};
use tracing::debug;

use crate::store::LedgerStore;

impl LedgerStore {
    /// Append one usage row for a completed request.
    ///
    /// Requests that report no usage are recorded with all-zero counters so
    /// the request itself still shows up in aggregation.
    pub async fn record_usage(
        &self,
        user_id: i64,
        model: &str,
        figure: UsageFigure,
    ) -> Result<(), ProxyError> {
        self.insert_usage(user_id, model, figure, Utc::now()).await
    }

    async fn insert_usage(
        &self,
        user_id: i64,
        model: &str,
        figure: UsageFigure,
        timestamp: DateTime<Utc>,
    ) -> Result<(), ProxyError> {
        sqlx::query(
            "INSERT INTO usage_logs (user_id, model, input_tokens, output_tokens, cached_tokens, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(model)
        .bind(i64::from(figure.input_tokens))
        .bind(i64::from(figure.output_tokens))
        .bind(i64::from(figure.cached_tokens))
        .bind(timestamp)
        .execute(self.pool())
        .await
        .map_err(ProxyError::persistence)?;

        debug!(
            user_id,
            model,
            input_tokens = figure.input_tokens,
            output_tokens = figure.output_tokens,
            cached_tokens = figure.cached_tokens,
            "Recorded usage"
        );
        Ok(())
    }

    /// Append one row to the error trace log.
    ///
    /// Used for backend failures and interrupted streams; the row is
    /// diagnostic only and never feeds cost aggregation.
    pub async fn record_error(
        &self,
        user_id: Option<i64>,
        model: Option<&str>,
        error_kind: &str,
        message: &str,
        status_code: Option<u16>,
    ) -> Result<(), ProxyError> {
        sqlx::query(
            "INSERT INTO error_logs (user_id, model, error_kind, message, status_code, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(model)
        .bind(error_kind)
        .bind(message)
        .bind(status_code.map(i64::from))
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(ProxyError::persistence)?;
        Ok(())
    }

    /// Test-only append with a caller-chosen timestamp, for windowed
    /// aggregation cases.
    #[cfg(test)]
    pub(crate) async fn record_usage_at(
        &self,
        user_id: i64,
        model: &str,
        figure: UsageFigure,
        timestamp: DateTime<Utc>,
    ) -> Result<(), ProxyError> {
        self.insert_usage(user_id, model, figure, timestamp).await
    }

    #[cfg(test)]
    pub(crate) async fn count_usage_rows(&self) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_logs")
            .fetch_one(self.pool())
            .await
            .expect("count query");
        count
    }

    #[cfg(test)]
    pub(crate) async fn count_error_rows(&self) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM error_logs")
            .fetch_one(self.pool())
            .await
            .expect("count query");
        count
    }
}
