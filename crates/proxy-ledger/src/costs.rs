//! Windowed cost aggregation over the usage ledger.
//!
//! Totals are recomputed from the raw rows on every query; there is no
//! materialized aggregate to drift out of sync with the ledger.

use std::collections::HashMap;

use proxy_core::ProxyError;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite};

use crate::store::LedgerStore;
use crate::window::TimeWindow;

/// Per-model slice of one user's totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCost {
    /// Model name as recorded at request time, after any mapping.
    pub model: String,
    /// Summed prompt tokens.
    pub total_input_tokens: i64,
    /// Summed completion tokens.
    pub total_output_tokens: i64,
    /// Summed cache-served prompt tokens.
    pub total_cached_tokens: i64,
    /// Number of ledger rows in the window.
    pub total_requests: i64,
}

/// Aggregated totals for one user inside a query window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCost {
    /// Owning user.
    pub username: String,
    /// Summed prompt tokens across all models.
    pub total_input_tokens: i64,
    /// Summed completion tokens across all models.
    pub total_output_tokens: i64,
    /// Summed cache-served prompt tokens across all models.
    pub total_cached_tokens: i64,
    /// Number of ledger rows in the window.
    pub total_requests: i64,
    /// Per-model breakdown, present only when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_costs: Option<Vec<ModelCost>>,
}

#[derive(FromRow)]
struct UserTotalsRow {
    username: String,
    input_tokens: i64,
    output_tokens: i64,
    cached_tokens: i64,
    requests: i64,
}

#[derive(FromRow)]
struct ModelTotalsRow {
    username: String,
    model: String,
    input_tokens: i64,
    output_tokens: i64,
    cached_tokens: i64,
    requests: i64,
}

/// Append the window's bounds as `WHERE`/`AND` clauses on `l.timestamp`.
fn push_window_filter(builder: &mut QueryBuilder<'_, Sqlite>, window: &TimeWindow) {
    let mut prefix = " WHERE ";
    if let Some(start) = window.start {
        builder.push(prefix).push("l.timestamp >= ").push_bind(start);
        prefix = " AND ";
    }
    if let Some(end) = window.end {
        builder.push(prefix).push("l.timestamp <= ").push_bind(end);
    }
}

impl LedgerStore {
    /// Sum ledger rows inside `window`, grouped per user and ordered by
    /// username.
    ///
    /// Only users with at least one row in the window appear; an inner join
    /// keeps idle users out of the report entirely. With `by_model` set,
    /// each entry also carries a per-model breakdown whose slices sum to
    /// the user's totals.
    pub async fn aggregate_costs(
        &self,
        window: &TimeWindow,
        by_model: bool,
    ) -> Result<Vec<UserCost>, ProxyError> {
        let totals = self.user_totals(window).await?;
        let mut breakdown = if by_model {
            self.model_totals(window).await?
        } else {
            HashMap::new()
        };

        Ok(totals
            .into_iter()
            .map(|row| {
                let model_costs = by_model
                    .then(|| breakdown.remove(&row.username).unwrap_or_default());
                UserCost {
                    username: row.username,
                    total_input_tokens: row.input_tokens,
                    total_output_tokens: row.output_tokens,
                    total_cached_tokens: row.cached_tokens,
                    total_requests: row.requests,
                    model_costs,
                }
            })
            .collect())
    }

    async fn user_totals(&self, window: &TimeWindow) -> Result<Vec<UserTotalsRow>, ProxyError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT u.username, \
             COALESCE(SUM(l.input_tokens), 0) AS input_tokens, \
             COALESCE(SUM(l.output_tokens), 0) AS output_tokens, \
             COALESCE(SUM(l.cached_tokens), 0) AS cached_tokens, \
             COUNT(l.id) AS requests \
             FROM users u JOIN usage_logs l ON l.user_id = u.id",
        );
        push_window_filter(&mut builder, window);
        builder.push(" GROUP BY u.id, u.username ORDER BY u.username");

        builder
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(ProxyError::persistence)
    }

    async fn model_totals(
        &self,
        window: &TimeWindow,
    ) -> Result<HashMap<String, Vec<ModelCost>>, ProxyError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT u.username, l.model, \
             COALESCE(SUM(l.input_tokens), 0) AS input_tokens, \
             COALESCE(SUM(l.output_tokens), 0) AS output_tokens, \
             COALESCE(SUM(l.cached_tokens), 0) AS cached_tokens, \
             COUNT(l.id) AS requests \
             FROM users u JOIN usage_logs l ON l.user_id = u.id",
        );
        push_window_filter(&mut builder, window);
        builder.push(" GROUP BY u.id, u.username, l.model ORDER BY u.username, l.model");

        let rows: Vec<ModelTotalsRow> = builder
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(ProxyError::persistence)?;

        let mut by_user: HashMap<String, Vec<ModelCost>> = HashMap::new();
        for row in rows {
            by_user.entry(row.username).or_default().push(ModelCost {
                model: row.model,
                total_input_tokens: row.input_tokens,
                total_output_tokens: row.output_tokens,
                total_cached_tokens: row.cached_tokens,
                total_requests: row.requests,
            });
        }
        Ok(by_user)
    }
}
