//! API key authentication middleware.
//!
//! Every `/v1` route passes through [`require_api_key`]. The presented
//! bearer token is matched exactly against issued keys; unknown keys are
//! refused with 401 and disabled keys with 403, before any admission slot
//! is taken or backend byte is sent.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use proxy_core::ProxyError;
use tracing::{debug, error, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Authenticate the request against the ledger's user table.
///
/// On success the resolved [`proxy_ledger::User`] is inserted into request
/// extensions for handlers to pick up.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let api_key = match bearer_token(request.headers()) {
        Ok(token) => token.to_owned(),
        Err(err) => {
            debug!(path = %request.uri().path(), "Request without usable credential");
            return ApiError::from(err).into_response();
        }
    };

    let user = match state.ledger.find_user_by_key(&api_key).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!(path = %request.uri().path(), "Unknown API key presented");
            return ApiError::from(ProxyError::Unauthenticated).into_response();
        }
        Err(err) => {
            error!(error = %err, "Key lookup failed");
            return ApiError::from(err).into_response();
        }
    };

    if !user.is_active {
        warn!(username = %user.username, "Disabled API key presented");
        return ApiError::from(ProxyError::Forbidden).into_response();
    }

    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Pull the bearer token out of the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ProxyError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(ProxyError::Unauthenticated)?;
    let value = value.to_str().map_err(|_| ProxyError::Unauthenticated)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(ProxyError::Unauthenticated)?
        .trim();
    if token.is_empty() {
        return Err(ProxyError::Unauthenticated);
    }
    Ok(token)
}
