//! Relays backend responses to the caller while settling accounting.
//!
//! Both relay modes end in exactly one of three outcomes: a usage row (the
//! request completed, possibly with zero reported usage), an error-log row
//! (the backend failed), or nothing (the caller disconnected first). The
//! admission permit rides inside [`RelayContext`] and is released when the
//! relay finishes or is dropped, whichever comes first.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use proxy_admission::AdmissionPermit;
use proxy_core::{extract_usage, ProxyError, StreamInspector, UsageFigure};
use proxy_ledger::{LedgerStore, User};
use serde_json::Value;
use tracing::{debug, warn};

use crate::forwarder::transport_error_kind;

/// Longest backend error excerpt kept in the error log.
const ERROR_EXCERPT_CHARS: usize = 500;

/// Accounting state for one admitted request.
pub struct RelayContext {
    ledger: LedgerStore,
    user_id: i64,
    username: String,
    model: String,
    _permit: AdmissionPermit,
}

impl RelayContext {
    /// Bind an admitted request to the identity and model it will be
    /// accounted under.
    pub fn new(ledger: LedgerStore, user: &User, model: String, permit: AdmissionPermit) -> Self {
        Self {
            ledger,
            user_id: user.id,
            username: user.username.clone(),
            model,
            _permit: permit,
        }
    }

    /// Append the usage row for a completed request. Persistence failures
    /// are logged, never surfaced: the caller already has its response.
    async fn complete(self, figure: UsageFigure) {
        if let Err(err) = self
            .ledger
            .record_usage(self.user_id, &self.model, figure)
            .await
        {
            warn!(
                error = %err,
                username = %self.username,
                model = %self.model,
                "Usage write failed after completed request"
            );
        }
    }

    /// Append an error-log row. Best effort.
    pub(crate) async fn fail(&self, kind: &str, message: &str, status: Option<u16>) {
        if let Err(err) = self
            .ledger
            .record_error(Some(self.user_id), Some(&self.model), kind, message, status)
            .await
        {
            warn!(error = %err, "Error log write failed");
        }
    }
}

/// Relay a batch JSON response and record the usage its body reports.
///
/// The caller receives the backend's bytes untouched; a body with no usage
/// object still yields a zero-usage row so the request itself is counted.
pub async fn relay_batch(
    upstream: reqwest::Response,
    ctx: RelayContext,
) -> Result<Response, ProxyError> {
    if !upstream.status().is_success() {
        return relay_backend_failure(upstream, &ctx).await;
    }

    let status = upstream.status();
    let content_type = passthrough_content_type(upstream.headers(), "application/json");
    let body = match upstream.bytes().await {
        Ok(body) => body,
        Err(err) => {
            ctx.fail(transport_error_kind(&err), &err.to_string(), None)
                .await;
            return Err(ProxyError::backend_unreachable(err));
        }
    };

    match serde_json::from_slice::<Value>(&body) {
        Ok(document) => {
            let figure = extract_usage(&document).unwrap_or_else(UsageFigure::zero);
            if figure.is_zero() {
                debug!(model = %ctx.model, "Backend reported no usage; recording zeros");
            }
            ctx.complete(figure).await;
        }
        Err(err) => {
            warn!(error = %err, model = %ctx.model, "Backend sent a 2xx body that is not JSON");
            ctx.fail("parse_error", &err.to_string(), Some(status.as_u16()))
                .await;
        }
    }

    Ok((status, [(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Relay a streaming response chunk-for-chunk while watching for the
/// usage frame.
///
/// Accounting settles when the backend closes the stream: the last usage
/// figure observed, or zeros if none ever arrived. A backend failure
/// mid-relay aborts the caller's connection and records no usage, since
/// the true output length is unknown. The caller hanging up drops the
/// stream, which frees the slot and skips the write the same way.
pub async fn relay_stream(
    upstream: reqwest::Response,
    ctx: RelayContext,
) -> Result<Response, ProxyError> {
    if !upstream.status().is_success() {
        return relay_backend_failure(upstream, &ctx).await;
    }

    let status = upstream.status();
    let content_type = passthrough_content_type(upstream.headers(), "text/event-stream");

    let relayed = async_stream::stream! {
        let mut inspector = StreamInspector::new();
        let mut chunks = std::pin::pin!(upstream.bytes_stream());

        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    inspector.observe(&chunk);
                    yield Ok::<Bytes, ProxyError>(chunk);
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        model = %ctx.model,
                        "Backend stream failed mid-relay; usage not recorded"
                    );
                    ctx.fail("stream_interrupted", &err.to_string(), None).await;
                    yield Err(ProxyError::stream_interrupted(err.to_string()));
                    return;
                }
            }
        }

        let figure = inspector.usage().unwrap_or_else(UsageFigure::zero);
        debug!(
            frames = inspector.frames_seen(),
            model = %ctx.model,
            "Stream complete"
        );
        ctx.complete(figure).await;
    };

    Ok((
        status,
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(relayed),
    )
        .into_response())
}

/// Relay a non-success backend response unchanged and log the failure.
/// No usage row is written for failed requests.
async fn relay_backend_failure(
    upstream: reqwest::Response,
    ctx: &RelayContext,
) -> Result<Response, ProxyError> {
    let status = upstream.status();
    let content_type = passthrough_content_type(upstream.headers(), "application/json");
    let body = upstream
        .bytes()
        .await
        .map_err(ProxyError::backend_unreachable)?;

    let excerpt: String = String::from_utf8_lossy(&body)
        .chars()
        .take(ERROR_EXCERPT_CHARS)
        .collect();
    warn!(status = %status, model = %ctx.model, "Backend answered with an error status");
    ctx.fail("backend_error", &excerpt, Some(status.as_u16()))
        .await;

    Ok((status, [(header::CONTENT_TYPE, content_type)], body).into_response())
}

pub(crate) fn passthrough_content_type(headers: &HeaderMap, fallback: &'static str) -> HeaderValue {
    headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use proxy_admission::AdmissionGate;
    use proxy_ledger::TimeWindow;

    async fn test_context(store: &LedgerStore, gate: &AdmissionGate) -> RelayContext {
        let user = store
            .find_user_by_username("alice")
            .await
            .expect("lookup")
            .expect("seeded user");
        let permit = gate.acquire().await.expect("slot free");
        RelayContext::new(store.clone(), &user, "gpt-4o".to_owned(), permit)
    }

    async fn seeded_store() -> LedgerStore {
        let store = LedgerStore::in_memory().await.expect("store opens");
        store.create_user("alice").await.expect("seed user");
        store
    }

    fn batch_response(status: u16, body: &'static str) -> reqwest::Response {
        let response = axum::http::Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .expect("valid response");
        reqwest::Response::from(response)
    }

    async fn totals(store: &LedgerStore) -> Vec<proxy_ledger::UserCost> {
        store
            .aggregate_costs(&TimeWindow::unbounded(), false)
            .await
            .expect("aggregate")
    }

    #[tokio::test]
    async fn test_batch_relays_body_and_records_usage() {
        let store = seeded_store().await;
        let gate = AdmissionGate::new(1);
        let ctx = test_context(&store, &gate).await;

        let body = r#"{"id":"cmpl-1","usage":{"prompt_tokens":100,"completion_tokens":20,"prompt_tokens_details":{"cached_tokens":80}}}"#;
        let response = relay_batch(batch_response(200, body), ctx)
            .await
            .expect("relay succeeds");

        assert_eq!(response.status(), StatusCode::OK);
        let relayed = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        assert_eq!(relayed.as_ref(), body.as_bytes());

        let report = totals(&store).await;
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].total_input_tokens, 100);
        assert_eq!(report[0].total_output_tokens, 20);
        assert_eq!(report[0].total_cached_tokens, 80);
        assert_eq!(report[0].total_requests, 1);
        assert_eq!(gate.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_batch_without_usage_records_zeros() {
        let store = seeded_store().await;
        let gate = AdmissionGate::new(1);
        let ctx = test_context(&store, &gate).await;

        let response = relay_batch(batch_response(200, r#"{"id":"cmpl-2"}"#), ctx)
            .await
            .expect("relay succeeds");
        assert_eq!(response.status(), StatusCode::OK);

        let report = totals(&store).await;
        assert_eq!(report[0].total_requests, 1);
        assert_eq!(report[0].total_input_tokens, 0);
        assert_eq!(report[0].total_output_tokens, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_never_downgrades_the_response() {
        let store = seeded_store().await;
        let gate = AdmissionGate::new(1);
        let ctx = test_context(&store, &gate).await;

        // Closing the pool makes the usage insert fail while the client's
        // response is already in hand.
        store.close().await;

        let body = r#"{"id":"cmpl-3","usage":{"prompt_tokens":5,"completion_tokens":2,"prompt_tokens_details":{"cached_tokens":0}}}"#;
        let response = relay_batch(batch_response(200, body), ctx)
            .await
            .expect("relay succeeds");

        assert_eq!(response.status(), StatusCode::OK);
        let relayed = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        assert_eq!(relayed.as_ref(), body.as_bytes());
        assert_eq!(gate.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_passes_through_without_usage_row() {
        let store = seeded_store().await;
        let gate = AdmissionGate::new(1);
        let ctx = test_context(&store, &gate).await;

        let body = r#"{"error":{"message":"rate limited"}}"#;
        let response = relay_batch(batch_response(429, body), ctx)
            .await
            .expect("relay succeeds");

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let relayed = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        assert_eq!(relayed.as_ref(), body.as_bytes());

        assert!(totals(&store).await.is_empty());
        assert_eq!(gate.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_stream_relays_bytes_verbatim_and_records_final_usage() {
        let store = seeded_store().await;
        let gate = AdmissionGate::new(1);
        let ctx = test_context(&store, &gate).await;

        let frames = [
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Hel\"}}],\"usage\":null}\n\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"lo\"}}],\"usage\":null}\n\n",
            "data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"prompt_tokens\":100,\"completion_tokens\":20,\"prompt_tokens_details\":{\"cached_tokens\":80}}}\n\n",
            "data: [DONE]\n\n",
        ];
        let chunks = frames
            .iter()
            .map(|frame| Ok::<_, std::io::Error>(Bytes::from_static(frame.as_bytes())))
            .collect::<Vec<_>>();

        let response = axum::http::Response::builder()
            .status(200)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .body(reqwest::Body::wrap_stream(futures::stream::iter(chunks)))
            .expect("valid response");

        let relayed = relay_stream(reqwest::Response::from(response), ctx)
            .await
            .expect("relay succeeds");
        assert_eq!(
            relayed
                .headers()
                .get(header::CONTENT_TYPE)
                .expect("content type"),
            "text/event-stream"
        );

        let body = axum::body::to_bytes(relayed.into_body(), usize::MAX)
            .await
            .expect("stream drains");
        assert_eq!(body.as_ref(), frames.concat().as_bytes());

        let report = totals(&store).await;
        assert_eq!(report[0].total_input_tokens, 100);
        assert_eq!(report[0].total_output_tokens, 20);
        assert_eq!(report[0].total_cached_tokens, 80);
        assert_eq!(gate.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_stream_without_usage_records_zeros() {
        let store = seeded_store().await;
        let gate = AdmissionGate::new(1);
        let ctx = test_context(&store, &gate).await;

        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"data: {\"choices\":[]}\n\n")),
            Ok(Bytes::from_static(b"data: [DONE]\n\n")),
        ];
        let response = axum::http::Response::builder()
            .status(200)
            .body(reqwest::Body::wrap_stream(futures::stream::iter(chunks)))
            .expect("valid response");

        let relayed = relay_stream(reqwest::Response::from(response), ctx)
            .await
            .expect("relay succeeds");
        axum::body::to_bytes(relayed.into_body(), usize::MAX)
            .await
            .expect("stream drains");

        let report = totals(&store).await;
        assert_eq!(report[0].total_requests, 1);
        assert_eq!(report[0].total_input_tokens, 0);
    }

    #[tokio::test]
    async fn test_interrupted_stream_drops_usage_and_frees_slot() {
        let store = seeded_store().await;
        let gate = AdmissionGate::new(1);
        let ctx = test_context(&store, &gate).await;

        let chunks = vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[]}\n\n")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "backend hung up",
            )),
        ];
        let response = axum::http::Response::builder()
            .status(200)
            .body(reqwest::Body::wrap_stream(futures::stream::iter(chunks)))
            .expect("valid response");

        let relayed = relay_stream(reqwest::Response::from(response), ctx)
            .await
            .expect("status was success");

        let read = axum::body::to_bytes(relayed.into_body(), usize::MAX).await;
        assert!(read.is_err(), "truncated stream must surface as an error");

        assert!(totals(&store).await.is_empty());
        assert_eq!(gate.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_client_disconnect_frees_slot_and_skips_accounting() {
        let store = seeded_store().await;
        let gate = AdmissionGate::new(1);
        let ctx = test_context(&store, &gate).await;

        let opening = vec![Ok::<_, std::io::Error>(Bytes::from_static(
            b"data: {\"choices\":[]}\n\n",
        ))];
        let never_finishes = futures::stream::iter(opening).chain(futures::stream::pending());
        let response = axum::http::Response::builder()
            .status(200)
            .body(reqwest::Body::wrap_stream(never_finishes))
            .expect("valid response");

        let relayed = relay_stream(reqwest::Response::from(response), ctx)
            .await
            .expect("relay succeeds");
        assert_eq!(gate.available_slots(), 0, "slot held while relaying");

        let mut delivered = relayed.into_body().into_data_stream();
        let chunk = delivered
            .next()
            .await
            .expect("first frame arrives")
            .expect("frame relays cleanly");
        assert_eq!(chunk.as_ref(), b"data: {\"choices\":[]}\n\n");

        // The caller hangs up mid-stream. Dropping the body must release
        // the slot and leave the ledger untouched.
        drop(delivered);

        assert_eq!(gate.available_slots(), 1);
        assert!(totals(&store).await.is_empty());
    }
}
