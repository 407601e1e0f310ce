use super::super::catalog::ProviderKind;
use super::super::pool::ProviderClient;
use super::super::stream::TokenSink;
use super::super::{ChatMessage, Role, WireMessage};
use super::{sdk, ProviderHandler, ProviderRequest};
use crate::error::RelayError;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

const REASONING_FORMAT_KEY: &str = "reasoning_format";
const REASONING_FORMAT_RAW: &str = "raw";

/// Groq fast inference over OpenAI-compatible chat completions.
#[derive(Debug, Default)]
pub struct FastInferenceHandler;

impl FastInferenceHandler {
    pub fn new() -> Self {
        Self
    }

    /// The upstream has no developer role; developer instructions ride as system text.
    pub fn translate_messages(system_prompt: &str, messages: &[ChatMessage]) -> Vec<WireMessage> {
        std::iter::once(WireMessage::new("system", system_prompt))
            .chain(messages.iter().map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::System | Role::Developer => "system",
                    Role::Assistant | Role::Agent => "assistant",
                };
                WireMessage::new(role, msg.content.as_str())
            }))
            .collect()
    }

    /// Reasoning models are asked to keep their thinking inline as
    /// `<think>` blocks, which the router splits out.
    fn extra_fields(request: &ProviderRequest) -> Vec<(&'static str, Value)> {
        if request.reasoning_capable {
            debug!(model = %request.model, "Requesting raw reasoning format");
            vec![(REASONING_FORMAT_KEY, Value::from(REASONING_FORMAT_RAW))]
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl ProviderHandler for FastInferenceHandler {
    fn kind(&self) -> ProviderKind {
        ProviderKind::FastInference
    }

    async fn handle(
        &self,
        client: &ProviderClient,
        request: &ProviderRequest,
        sink: Option<&mut dyn TokenSink>,
    ) -> Result<String, RelayError> {
        let messages = Self::translate_messages(&request.system_prompt, &request.messages);

        let sdk_request = sdk::build_request(
            self.kind(),
            &request.model,
            &messages,
            &request.params,
            sink.is_some(),
        )?;
        let body = sdk::request_body(self.kind(), &sdk_request, &Self::extra_fields(request))?;

        match sink {
            Some(sink) => sdk::stream(client, &body, sink).await,
            None => sdk::complete(client, &body).await,
        }
    }
}
