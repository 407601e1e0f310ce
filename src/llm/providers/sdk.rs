//! OpenAI-style chat completions shared by the fast and hosted paths.
//!
//! Requests are shaped with the SDK's typed builders and sent over the
//! pooled client's retrying transport, which sees every HTTP status.

use super::super::catalog::ProviderKind;
use super::super::params::ModelParameters;
use super::super::pool::ProviderClient;
use super::super::stream::{SseLine, SseLineDecoder, TokenSink};
use super::super::WireMessage;
use super::upstream_error_message;
use crate::error::RelayError;
use async_openai::{
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestDeveloperMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Build an OpenAI-style chat completion request from translated messages.
#[allow(deprecated)]
pub(super) fn build_request(
    kind: ProviderKind,
    model: &str,
    messages: &[WireMessage],
    params: &ModelParameters,
    stream: bool,
) -> Result<CreateChatCompletionRequest, RelayError> {
    let messages = messages
        .iter()
        .map(|msg| convert_message(kind, msg))
        .collect::<Result<Vec<_>, _>>()?;

    let mut req_builder = CreateChatCompletionRequestArgs::default();
    req_builder
        .model(model)
        .messages(messages)
        .temperature(params.temperature)
        .max_tokens(params.max_tokens);

    if let Some(top_p) = params.top_p {
        req_builder.top_p(top_p);
    }
    if let Some(penalty) = params.frequency_penalty {
        req_builder.frequency_penalty(penalty);
    }
    if let Some(penalty) = params.presence_penalty {
        req_builder.presence_penalty(penalty);
    }
    if stream {
        req_builder.stream(true);
    }

    req_builder.build().map_err(|e| sdk_error(kind, e))
}

/// JSON body for a typed request, with provider-specific keys merged in.
pub(super) fn request_body(
    kind: ProviderKind,
    request: &CreateChatCompletionRequest,
    extra: &[(&str, Value)],
) -> Result<Value, RelayError> {
    let mut body = serde_json::to_value(request).map_err(|e| {
        RelayError::upstream(kind, None, format!("Failed to encode request: {}", e))
    })?;
    if let Some(object) = body.as_object_mut() {
        for (key, value) in extra {
            object.insert((*key).to_string(), value.clone());
        }
    }
    Ok(body)
}

fn convert_message(
    kind: ProviderKind,
    msg: &WireMessage,
) -> Result<ChatCompletionRequestMessage, RelayError> {
    let content = msg.content.clone();
    let message: Result<ChatCompletionRequestMessage, OpenAIError> = match msg.role {
        "system" => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()
            .map(Into::into),
        "developer" => ChatCompletionRequestDeveloperMessageArgs::default()
            .content(content)
            .build()
            .map(Into::into),
        "user" => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map(Into::into),
        "assistant" => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()
            .map(Into::into),
        other => {
            return Err(RelayError::Validation(format!(
                "Role '{}' is not accepted by {}",
                other, kind
            )))
        }
    };

    message.map_err(|e| sdk_error(kind, e))
}

async fn post(
    client: &ProviderClient,
    body: &Value,
    streaming: bool,
) -> Result<reqwest::Response, RelayError> {
    let url = format!("{}/chat/completions", client.endpoint());

    client
        .send_with_retry(|http| {
            let mut builder = http.post(&url).bearer_auth(client.credential()).json(body);
            builder = if streaming {
                builder.header(reqwest::header::ACCEPT, "text/event-stream")
            } else {
                builder.timeout(client.request_timeout())
            };
            if let Some(version) = client.api_version() {
                builder = builder.query(&[("api-version", version)]);
            }
            builder
        })
        .await
}

/// One-shot completion; returns the first choice's content, or empty text
/// when the upstream sent none.
pub(super) async fn complete(client: &ProviderClient, body: &Value) -> Result<String, RelayError> {
    let kind = client.kind();
    let response = post(client, body, false).await?;
    let text = response
        .text()
        .await
        .map_err(|e| RelayError::upstream(kind, None, e.to_string()))?;

    let parsed: CompletionResponse = serde_json::from_str(&text)
        .map_err(|e| RelayError::upstream(kind, None, format!("Malformed response: {}", e)))?;
    if let Some(error) = parsed.error {
        return Err(error_payload(kind, error));
    }

    // Missing choices or content are normalized by the caller.
    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .unwrap_or_default())
}

/// Token stream read as `data:` lines. The stream must end with `[DONE]`;
/// an unparseable chunk or an early end of input is an upstream error.
pub(super) async fn stream(
    client: &ProviderClient,
    body: &Value,
    sink: &mut dyn TokenSink,
) -> Result<String, RelayError> {
    let kind = client.kind();
    let response = post(client, body, true).await?;

    let mut bytes = response.bytes_stream();
    let mut decoder = SseLineDecoder::new();
    let mut assembled = String::new();
    let mut finished = false;

    'read: while let Some(chunk) = bytes.next().await {
        let chunk = chunk.map_err(|e| RelayError::upstream(kind, None, e.to_string()))?;
        for line in decoder.feed(&chunk) {
            if !handle_line(kind, line, sink, &mut assembled)? {
                finished = true;
                break 'read;
            }
        }
    }
    if !finished {
        if let Some(line) = decoder.finish() {
            finished = !handle_line(kind, line, sink, &mut assembled)?;
        }
    }
    if !finished {
        return Err(RelayError::upstream(
            kind,
            None,
            "Stream ended before [DONE]",
        ));
    }

    debug!(provider = %kind, chars = assembled.len(), "Stream finished");
    Ok(assembled)
}

/// Returns `false` once the terminal marker is seen.
fn handle_line(
    kind: ProviderKind,
    line: SseLine,
    sink: &mut dyn TokenSink,
    assembled: &mut String,
) -> Result<bool, RelayError> {
    let payload = match line {
        SseLine::Done => return Ok(false),
        SseLine::Data(payload) => payload,
    };

    let chunk: StreamChunk = serde_json::from_str(&payload).map_err(|e| {
        RelayError::upstream(kind, None, format!("Malformed stream chunk: {}", e))
    })?;
    if let Some(error) = chunk.error {
        return Err(error_payload(kind, error));
    }

    for choice in chunk.choices {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            sink.push(&content);
            assembled.push_str(&content);
        }
    }
    Ok(true)
}

fn error_payload(kind: ProviderKind, error: Value) -> RelayError {
    RelayError::upstream(
        kind,
        None,
        upstream_error_message(&serde_json::json!({ "error": error }).to_string()),
    )
}

pub(super) fn sdk_error(kind: ProviderKind, err: OpenAIError) -> RelayError {
    match err {
        OpenAIError::ApiError(api) => RelayError::upstream(kind, None, api.message),
        other => RelayError::upstream(kind, None, other.to_string()),
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
