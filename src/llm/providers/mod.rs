//! Provider handlers: one per upstream family, each owning its request
//! envelope, role vocabulary and transport.

mod fast;
mod gemini;
mod hosted;
mod sdk;

pub use fast::FastInferenceHandler;
pub use gemini::{resolve_gemini_alias, GeminiHandler};
pub use hosted::HostedInferenceHandler;

use super::catalog::ProviderKind;
use super::params::ModelParameters;
use super::pool::ProviderClient;
use super::stream::TokenSink;
use super::ChatMessage;
use crate::error::RelayError;
use async_trait::async_trait;

/// Everything a handler needs to shape one upstream request.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Model id as the upstream knows it
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub system_prompt: String,
    pub params: ModelParameters,
    pub reasoning_capable: bool,
}

#[async_trait]
pub trait ProviderHandler: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Run the request and return the raw assembled response text.
    ///
    /// With a sink, text is pushed to it as it arrives from the upstream;
    /// the returned text is the concatenation of everything pushed.
    async fn handle(
        &self,
        client: &ProviderClient,
        request: &ProviderRequest,
        sink: Option<&mut dyn TokenSink>,
    ) -> Result<String, RelayError>;
}

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Best-effort human readable message from an upstream error body.
pub fn upstream_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let message = json
            .pointer("/error/message")
            .or_else(|| json.get("error").filter(|e| e.is_string()))
            .or_else(|| json.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    match trimmed.char_indices().nth(MAX_ERROR_MESSAGE_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
