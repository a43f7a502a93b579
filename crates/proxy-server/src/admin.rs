//! Operator endpoints for key issuance, revocation, and cost reporting.
//!
//! These routes carry no authentication of their own and are meant to be
//! bound to a trusted interface or fronted by the deployment's own access
//! control.

use axum::extract::State;
use axum::response::Json;
use chrono::{DateTime, NaiveDateTime, Utc};
use proxy_ledger::{TimeWindow, User, UserCost};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::extractors::{JsonBody, QueryParams};
use crate::state::AppState;

/// Body for key issuance.
#[derive(Debug, Deserialize)]
pub struct GenKeyRequest {
    /// Name the new key is issued under.
    pub username: String,
}

/// Freshly issued credential. The key is only ever shown here.
#[derive(Debug, Serialize)]
pub struct GenKeyResponse {
    /// Owner of the key.
    pub username: String,
    /// The credential itself.
    pub api_key: String,
}

/// All registered users, including disabled ones.
#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    /// Newest first.
    pub users: Vec<User>,
}

/// Query string for the cost report.
#[derive(Debug, Deserialize)]
pub struct CostsQuery {
    /// Convenience window covering the trailing N hours.
    pub last_hours: Option<u32>,
    /// Inclusive window start, RFC 3339 or naive `YYYY-MM-DDTHH:MM:SS`.
    pub start_time: Option<String>,
    /// Inclusive window end, same formats.
    pub end_time: Option<String>,
    /// Attach a per-model breakdown to every entry.
    #[serde(default)]
    pub by_model: bool,
}

/// Aggregated totals per user.
#[derive(Debug, Serialize)]
pub struct ListCostsResponse {
    /// Ordered by username.
    pub costs: Vec<UserCost>,
}

/// Body for key revocation. Exactly one identifier is required; when both
/// are sent the username wins.
#[derive(Debug, Deserialize)]
pub struct ForbidKeyRequest {
    /// Disable by username.
    pub username: Option<String>,
    /// Disable by the key itself.
    pub api_key: Option<String>,
}

/// Revocation outcome.
#[derive(Debug, Serialize)]
pub struct ForbidKeyResponse {
    /// Always true on a 2xx; errors go through the error body instead.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
}

/// Issue a new API key under a unique username.
pub async fn gen_key(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<GenKeyRequest>,
) -> Result<Json<GenKeyResponse>, ApiError> {
    let username = request.username.trim();
    if username.is_empty() {
        return Err(ApiError::bad_request("username must not be empty"));
    }

    let user = state.ledger.create_user(username).await?;
    Ok(Json(GenKeyResponse {
        username: user.username,
        api_key: user.api_key,
    }))
}

/// List every registered user, newest first.
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    let users = state.ledger.list_users().await?;
    Ok(Json(ListUsersResponse { users }))
}

/// Report aggregated token usage per user inside an optional time window.
pub async fn list_costs(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<CostsQuery>,
) -> Result<Json<ListCostsResponse>, ApiError> {
    let start = parse_timestamp("start_time", query.start_time.as_deref())?;
    let end = parse_timestamp("end_time", query.end_time.as_deref())?;
    let window = TimeWindow::resolve(query.last_hours, start, end, Utc::now())?;

    let costs = state.ledger.aggregate_costs(&window, query.by_model).await?;
    Ok(Json(ListCostsResponse { costs }))
}

/// Disable an API key by username or by the key itself.
///
/// The user row and its usage history survive; only admission is revoked.
/// Disabling an already-disabled user reports success without touching
/// the row again.
pub async fn forbid_key(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ForbidKeyRequest>,
) -> Result<Json<ForbidKeyResponse>, ApiError> {
    let user = match (&request.username, &request.api_key) {
        (None, None) => {
            return Err(ApiError::bad_request(
                "Either username or api_key must be provided",
            ));
        }
        (Some(username), _) => state.ledger.find_user_by_username(username).await?,
        (None, Some(api_key)) => state.ledger.find_user_by_key(api_key).await?,
    };
    let Some(user) = user else {
        return Err(ApiError::not_found("User not found"));
    };

    if !user.is_active {
        return Ok(Json(ForbidKeyResponse {
            success: true,
            message: format!("User '{}' is already disabled", user.username),
        }));
    }

    state.ledger.disable_user(user.id).await?;
    info!(username = %user.username, "API key revoked");
    Ok(Json(ForbidKeyResponse {
        success: true,
        message: format!("User '{}' has been disabled", user.username),
    }))
}

/// Accept RFC 3339 first, then a naive timestamp interpreted as UTC.
fn parse_timestamp(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| ApiError::bad_request(format!("{field} is not a valid timestamp: {raw}")))
}
