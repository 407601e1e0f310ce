pub mod cache;
pub mod catalog;
pub mod params;
pub mod pool;
pub mod providers;
pub mod reasoning;
pub mod routing;
pub mod stream;

pub use cache::ResponseCache;
pub use catalog::{ModelCatalog, ModelDescriptor, ProviderKind};
pub use params::{ModelParameters, ParameterResolver};
pub use pool::{ClientPool, ProviderClient, RetryPolicy};
pub use routing::{RouteState, RoutingCore};
pub use stream::{StreamCallbacks, StreamEvent};

use serde::{Deserialize, Serialize};

/// Conversation role as received from the UI.
///
/// `Agent` is the UI's name for the assistant side of the conversation and
/// never leaves the service untranslated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
    Assistant,
    Developer,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::Developer => "developer",
            Role::Agent => "agent",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A single chat turn to route.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
        }
    }
}

/// Normalized result of a routed request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// Visible answer text, never empty.
    pub content: String,
    /// Text extracted from `<think>` blocks, if any.
    pub reasoning: Option<String>,
    pub model: String,
    pub cached: bool,
}

/// Message in a provider's own role vocabulary, ready to be serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Placeholder returned when a provider produced no usable text.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "No response generated.";
