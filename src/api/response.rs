use crate::llm::ModelDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Assistant message returned by `POST /chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl AssistantMessage {
    pub fn new(content: String, reasoning: Option<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            timestamp: Utc::now(),
            reasoning,
        }
    }
}

/// Buffered chat response
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: AssistantMessage,
}

/// Models list response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsResponse {
    pub default_model: String,
    pub models: Vec<ModelDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptOverride {
    pub prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetPromptRequest {
    pub prompt: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// One event of a streamed chat response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SseChunk {
    Token { token: String },
    Error { error: String },
}
