//! Handlers for the caller-facing API surface.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use proxy_core::{CompletionPayload, ProxyError};
use proxy_ledger::User;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ApiError;
use crate::extractors::CurrentUser;
use crate::forwarder::transport_error_kind;
use crate::relay::{self, RelayContext};
use crate::state::AppState;

/// Service banner returned at the root path.
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "LLM API Proxy is running" }))
}

/// Liveness payload for `/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` when the process can answer at all.
    pub status: &'static str,
    /// Crate version baked in at build time.
    pub version: &'static str,
}

/// Report process liveness.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Proxy a chat completion request.
pub async fn chat_completions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Bytes,
) -> Result<Response, ApiError> {
    proxy_completion(&state, &user, &body, "/v1/chat/completions").await
}

/// Proxy a legacy text completion request.
pub async fn completions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Bytes,
) -> Result<Response, ApiError> {
    proxy_completion(&state, &user, &body, "/v1/completions").await
}

/// Relay the backend's model catalog.
///
/// Authenticated but not admission gated: the catalog costs the backend
/// nothing, so it must stay reachable even when completions are saturated.
pub async fn list_models(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> Result<Response, ApiError> {
    let upstream = state
        .forwarder
        .models()
        .await
        .map_err(ProxyError::backend_unreachable)?;

    let status = upstream.status();
    let content_type = relay::passthrough_content_type(upstream.headers(), "application/json");
    let body = upstream
        .bytes()
        .await
        .map_err(ProxyError::backend_unreachable)?;

    Ok((status, [(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Full proxy cycle for one completion request: parse, map the model,
/// wait for an admission slot, forward, relay, account.
///
/// The slot is held from here until the relay settles, covering the whole
/// backend call. Transport failures are logged against the user before the
/// error response goes out; no usage row is written for them.
async fn proxy_completion(
    state: &AppState,
    user: &User,
    body: &[u8],
    path: &str,
) -> Result<Response, ApiError> {
    let mut payload = CompletionPayload::parse(body)?;

    let requested = payload.model().to_owned();
    let upstream_model = state.config.map_model(&requested).to_owned();
    if upstream_model != requested {
        debug!(requested = %requested, upstream = %upstream_model, "Rewrote model name");
        payload.rewrite_model(&upstream_model);
    }

    let permit = state.gate.acquire().await?;
    let ctx = RelayContext::new(state.ledger.clone(), user, upstream_model, permit);

    match state.forwarder.completion(path, payload.body()).await {
        Ok(upstream) => {
            let relayed = if payload.is_streaming() {
                relay::relay_stream(upstream, ctx).await
            } else {
                relay::relay_batch(upstream, ctx).await
            };
            relayed.map_err(ApiError::from)
        }
        Err(err) => {
            ctx.fail(transport_error_kind(&err), &err.to_string(), None)
                .await;
            if err.is_timeout() {
                Err(ApiError::from(ProxyError::backend(
                    StatusCode::GATEWAY_TIMEOUT,
                    "Request to backend timed out",
                )))
            } else {
                Err(ApiError::from(ProxyError::backend_unreachable(err)))
            }
        }
    }
}
