//! Custom Axum extractors for the proxy.

use axum::extract::{FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::{async_trait, body::Bytes};
use proxy_core::ProxyError;
use proxy_ledger::User;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;

/// The authenticated user resolved by the auth middleware.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(Self)
            .ok_or_else(|| ApiError::from(ProxyError::Unauthenticated))
    }
}

/// JSON body extractor that answers malformed input with the proxy's own
/// error body instead of Axum's plain-text rejection.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> axum::extract::FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|err| ApiError::bad_request(format!("Failed to read request body: {err}")))?;

        let value: T = serde_json::from_slice(&bytes).map_err(|err| {
            debug!(error = %err, "JSON parse error");
            ApiError::bad_request(format!("Invalid JSON: {err}"))
        })?;

        Ok(Self(value))
    }
}

/// Query string extractor with the same uniform error body.
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::try_from_uri(&parts.uri)
            .map_err(|err| ApiError::bad_request(format!("Invalid query parameters: {err}")))?;
        Ok(Self(value))
    }
}
