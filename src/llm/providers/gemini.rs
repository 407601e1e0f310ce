use super::super::catalog::ProviderKind;
use super::super::params::ModelParameters;
use super::super::pool::ProviderClient;
use super::super::stream::TokenSink;
use super::super::{ChatMessage, Role};
use super::{upstream_error_message, ProviderHandler, ProviderRequest};
use crate::error::RelayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Catalog ids mapped to the versioned names the Gemini API serves.
const GEMINI_ALIASES: &[(&str, &str)] = &[
    ("gemini-flash", "gemini-2.0-flash-001"),
    ("gemini-2.0-flash", "gemini-2.0-flash-001"),
    ("gemini-pro", "gemini-1.5-pro-002"),
    ("gemini-1.5-pro", "gemini-1.5-pro-002"),
    ("gemini-1.5-flash", "gemini-1.5-flash-002"),
];

pub fn resolve_gemini_alias(model_id: &str) -> &str {
    GEMINI_ALIASES
        .iter()
        .find(|(alias, _)| *alias == model_id)
        .map(|(_, target)| *target)
        .unwrap_or(model_id)
}

/// Google Gemini `generateContent`. The API call is not streamed, so a
/// streaming caller receives the whole answer as one token.
#[derive(Debug, Default)]
pub struct GeminiHandler;

impl GeminiHandler {
    pub fn new() -> Self {
        Self
    }

    /// Gemini only knows `user` and `model`; the system prompt becomes the
    /// first user turn and every non-assistant role collapses to `user`.
    pub fn translate_messages(system_prompt: &str, messages: &[ChatMessage]) -> Vec<Content> {
        std::iter::once(Content::text("user", system_prompt))
            .chain(messages.iter().map(|msg| {
                let role = match msg.role {
                    Role::Assistant => "model",
                    Role::User | Role::System | Role::Developer | Role::Agent => "user",
                };
                Content::text(role, &msg.content)
            }))
            .collect()
    }

    fn build_body(request: &ProviderRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: Self::translate_messages(&request.system_prompt, &request.messages),
            generation_config: GenerationConfig::from(&request.params),
        }
    }
}

#[async_trait]
impl ProviderHandler for GeminiHandler {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn handle(
        &self,
        client: &ProviderClient,
        request: &ProviderRequest,
        sink: Option<&mut dyn TokenSink>,
    ) -> Result<String, RelayError> {
        let model = resolve_gemini_alias(&request.model);
        let url = format!("{}/models/{}:generateContent", client.endpoint(), model);
        let body = Self::build_body(request);

        debug!(model, turns = body.contents.len(), "Calling Gemini");

        let response = client
            .send_with_retry(|http| {
                http.post(&url)
                    .query(&[("key", client.credential())])
                    .timeout(client.request_timeout())
                    .json(&body)
            })
            .await?;

        let raw = response
            .text()
            .await
            .map_err(|e| RelayError::upstream(ProviderKind::Gemini, None, e.to_string()))?;
        let text = extract_text(&raw)?;

        if let Some(sink) = sink {
            if !text.is_empty() {
                sink.push(&text);
            }
        }
        Ok(text)
    }
}

fn extract_text(raw: &str) -> Result<String, RelayError> {
    let parsed: GenerateContentResponse = serde_json::from_str(raw).map_err(|e| {
        RelayError::upstream(
            ProviderKind::Gemini,
            None,
            format!("Malformed response: {}", e),
        )
    })?;

    if parsed.error.is_some() {
        return Err(RelayError::upstream(
            ProviderKind::Gemini,
            None,
            upstream_error_message(raw),
        ));
    }

    Ok(parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

impl From<&ModelParameters> for GenerationConfig {
    fn from(params: &ModelParameters) -> Self {
        Self {
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
            top_p: params.top_p,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}
