//! Route table and middleware stack for the proxy API.

use axum::body::Body;
use axum::http::Request;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{admin, auth, handlers};

/// Assemble the application router.
///
/// Every request gets an `x-request-id` (generated when the caller sent
/// none) which is echoed on the response and attached to the request span.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Service endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // Authenticated completion surface
        .nest("/v1", proxy_routes(state.clone()))
        // Operator surface
        .nest("/admin", admin_routes())
        // Layered outermost-last: ids are set before the span opens.
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// OpenAI-compatible routes, gated behind API-key authentication.
fn proxy_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/chat/completions", post(handlers::chat_completions))
        .route("/completions", post(handlers::completions))
        .route("/models", get(handlers::list_models))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_key,
        ))
}

/// Key management and cost reporting.
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/gen_key", post(admin::gen_key))
        .route("/list_users", get(admin::list_users))
        .route("/list_costs", get(admin::list_costs))
        .route("/forbid_key", post(admin::forbid_key))
}

fn request_span(request: &Request<Body>) -> tracing::Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}
