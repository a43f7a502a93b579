//! Token-usage figures and their extraction from backend responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token counts attributable to one completed proxied request.
///
/// `cached_tokens` counts the subset of `input_tokens` that the backend served
/// from its prompt cache; it can never exceed `input_tokens`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageFigure {
    /// Tokens consumed by the prompt.
    pub input_tokens: u32,
    /// Tokens produced by the completion.
    pub output_tokens: u32,
    /// Prompt tokens served from the backend-side cache.
    pub cached_tokens: u32,
}

impl UsageFigure {
    /// Create a figure, clamping `cached_tokens` to `input_tokens`.
    pub fn new(input_tokens: u32, output_tokens: u32, cached_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cached_tokens: cached_tokens.min(input_tokens),
        }
    }

    /// The all-zero figure recorded when a response carried no usage data.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether every counter is zero.
    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0 && self.cached_tokens == 0
    }
}

/// Wire shape of the `usage` object in OpenAI-style responses.
#[derive(Debug, Default, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u32,
}

/// Read the usage figure from a response body or stream-event payload.
///
/// Returns `None` when the body has no `usage` object, when it is explicitly
/// `null` (intermediate stream chunks), or when it does not parse as token
/// counts. Absent usage is not an error anywhere in the pipeline; callers
/// substitute [`UsageFigure::zero`].
pub fn extract_usage(body: &Value) -> Option<UsageFigure> {
    let usage = body.get("usage")?;
    if usage.is_null() {
        return None;
    }
    let payload: UsagePayload = serde_json::from_value(usage.clone()).ok()?;
    Some(UsageFigure::new(
        payload.prompt_tokens,
        payload.completion_tokens,
        payload
            .prompt_tokens_details
            .unwrap_or_default()
            .cached_tokens,
    ))
}
