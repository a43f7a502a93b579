//! Parsed view over a caller's completion request body.
//!
//! The proxy relays request bodies rather than remodeling them: the payload
//! keeps the caller's JSON intact and only reads the two fields the pipeline
//! needs (`model` for accounting, `stream` for response-mode selection). The
//! sole permitted mutation is a model-name rewrite from the configured map.

use serde_json::Value;

use crate::error::ProxyError;

/// A caller's completion request, parsed just enough to route and account it.
#[derive(Debug, Clone)]
pub struct CompletionPayload {
    body: Value,
    model: String,
    stream: bool,
}

impl CompletionPayload {
    /// Parse a request body.
    ///
    /// Fails with [`ProxyError::InvalidArgument`] when the body is not a JSON
    /// object or carries no usable `model` string.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProxyError> {
        let body: Value = serde_json::from_slice(bytes)
            .map_err(|err| ProxyError::invalid_argument(format!("Request body is not valid JSON: {err}")))?;
        if !body.is_object() {
            return Err(ProxyError::invalid_argument(
                "Request body must be a JSON object",
            ));
        }
        let model = body
            .get("model")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| ProxyError::invalid_argument("Request body must include a model name"))?;
        let stream = body
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            body,
            model,
            stream,
        })
    }

    /// The model name the request will be accounted under.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the caller asked for an incremental event-stream response.
    pub fn is_streaming(&self) -> bool {
        self.stream
    }

    /// Rewrite the model name in place (configured model mapping).
    pub fn rewrite_model(&mut self, model: &str) {
        if let Some(object) = self.body.as_object_mut() {
            object.insert("model".to_owned(), Value::String(model.to_owned()));
        }
        self.model = model.to_owned();
    }

    /// The JSON body to forward to the backend.
    pub fn body(&self) -> &Value {
        &self.body
    }
}
