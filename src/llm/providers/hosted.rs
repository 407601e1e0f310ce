use super::super::catalog::ProviderKind;
use super::super::pool::ProviderClient;
use super::super::stream::TokenSink;
use super::super::{ChatMessage, Role, WireMessage};
use super::{sdk, ProviderHandler, ProviderRequest};
use crate::error::RelayError;
use async_trait::async_trait;
use tracing::debug;

/// GitHub-hosted inference: OpenAI-compatible chat completions with the
/// speed-optimized parameter override. Streams are read as `data:` lines
/// so tokens reach the caller as soon as the upstream flushes them.
#[derive(Debug, Default)]
pub struct HostedInferenceHandler;

impl HostedInferenceHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn translate_messages(system_prompt: &str, messages: &[ChatMessage]) -> Vec<WireMessage> {
        std::iter::once(WireMessage::new("system", system_prompt))
            .chain(messages.iter().map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::System => "system",
                    Role::Assistant | Role::Agent => "assistant",
                    Role::Developer => "developer",
                };
                WireMessage::new(role, msg.content.as_str())
            }))
            .collect()
    }
}

#[async_trait]
impl ProviderHandler for HostedInferenceHandler {
    fn kind(&self) -> ProviderKind {
        ProviderKind::HostedInference
    }

    async fn handle(
        &self,
        client: &ProviderClient,
        request: &ProviderRequest,
        sink: Option<&mut dyn TokenSink>,
    ) -> Result<String, RelayError> {
        let messages = Self::translate_messages(&request.system_prompt, &request.messages);

        let params = request.params.speed_optimized();
        let sdk_request = sdk::build_request(
            self.kind(),
            &request.model,
            &messages,
            &params,
            sink.is_some(),
        )?;
        let body = sdk::request_body(self.kind(), &sdk_request, &[])?;
        debug!(model = %request.model, max_tokens = params.max_tokens, "Hosted request");

        match sink {
            Some(sink) => sdk::stream(client, &body, sink).await,
            None => sdk::complete(client, &body).await,
        }
    }
}
