use crate::api::{
    ApiError, AssistantMessage, CacheClearResponse, ChatResponse, ModelsResponse, PromptOverride,
    SetPromptRequest, SseChunk,
};
use crate::core::Router;
use crate::llm::stream::ChannelCallbacks;
use crate::llm::{ChatMessage, StreamEvent};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{
    sse::{Event, Sse},
    IntoResponse, Response,
};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Validated body of `POST /chat`
#[derive(Debug)]
pub struct ChatBody {
    pub messages: Vec<ChatMessage>,
    pub model_id: Option<String>,
    pub stream: bool,
}

impl ChatBody {
    /// Parse and validate a raw request body.
    ///
    /// Everything the handler cannot work with is a 400, including bodies
    /// that are not JSON at all.
    pub fn parse(body: &[u8]) -> Result<Self, ApiError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?;

        let messages = match value.get("messages") {
            Some(messages @ serde_json::Value::Array(_)) => {
                serde_json::from_value::<Vec<ChatMessage>>(messages.clone())
                    .map_err(|e| ApiError::BadRequest(format!("Invalid message: {}", e)))?
            }
            Some(_) => {
                return Err(ApiError::BadRequest(
                    "messages must be an array".to_string(),
                ))
            }
            None => return Err(ApiError::BadRequest("messages is required".to_string())),
        };

        // null counts as absent
        let model_id = match value.get("modelId") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(id)) => Some(id.clone()),
            Some(_) => return Err(ApiError::BadRequest("modelId must be a string".to_string())),
        };
        let stream = match value.get("stream") {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(stream)) => *stream,
            Some(_) => return Err(ApiError::BadRequest("stream must be a boolean".to_string())),
        };

        Ok(Self {
            messages,
            model_id,
            stream,
        })
    }
}

/// POST /chat - Route a conversation to its model
pub async fn chat(State(router): State<Router>, body: Bytes) -> Result<Response, ApiError> {
    let body = ChatBody::parse(&body)?;

    tracing::debug!(
        "Chat request: model={:?}, messages={}, stream={}",
        body.model_id,
        body.messages.len(),
        body.stream
    );

    if body.stream {
        return Ok(chat_stream_sse(router, body));
    }

    let response = router
        .handle_chat(body.model_id.as_deref(), body.messages)
        .await?;

    Ok((
        StatusCode::OK,
        Json(ChatResponse {
            message: AssistantMessage::new(response.content, response.reasoning),
        }),
    )
        .into_response())
}

/// SSE streaming chat response
fn chat_stream_sse(router: Router, body: ChatBody) -> Response {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut callbacks = ChannelCallbacks::new(tx);
        if let Err(e) = router
            .handle_chat_stream(body.model_id.as_deref(), body.messages, &mut callbacks)
            .await
        {
            // Already forwarded to the client as an error event.
            tracing::debug!("Stream ended with error: {}", e);
        }
    });

    let sse_stream = UnboundedReceiverStream::new(rx).filter_map(|event| async move {
        match event {
            StreamEvent::Start => None,
            StreamEvent::Delta { token } => {
                Some(Event::default().json_data(SseChunk::Token { token }))
            }
            StreamEvent::Done { .. } => Some(Ok(Event::default().data("[DONE]"))),
            StreamEvent::Error { error } => {
                Some(Event::default().json_data(SseChunk::Error { error }))
            }
        }
    });

    Sse::new(sse_stream).into_response()
}

/// GET /models - Catalog for the model picker
pub async fn list_models(State(router): State<Router>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        default_model: router.default_model().to_string(),
        models: router.models().to_vec(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CacheQuery {
    #[serde(default)]
    pub model: Option<String>,
}

/// DELETE /cache - Drop cached responses
pub async fn clear_cache(
    State(router): State<Router>,
    Query(query): Query<CacheQuery>,
) -> Json<CacheClearResponse> {
    let removed = router.clear_cache(query.model.as_deref());
    Json(CacheClearResponse { removed })
}

/// GET /prompt - Current system prompt override
pub async fn get_prompt(State(router): State<Router>) -> Result<Json<PromptOverride>, ApiError> {
    let prompt = router.prompt_override().await?;
    Ok(Json(PromptOverride { prompt }))
}

/// PUT /prompt - Replace the system prompt override
pub async fn set_prompt(
    State(router): State<Router>,
    Json(req): Json<SetPromptRequest>,
) -> Result<Json<PromptOverride>, ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt cannot be empty".to_string()));
    }

    router.set_prompt_override(&req.prompt).await?;
    tracing::info!("System prompt override updated ({} chars)", req.prompt.len());

    Ok(Json(PromptOverride {
        prompt: Some(req.prompt),
    }))
}

/// DELETE /prompt - Remove the override
pub async fn clear_prompt(State(router): State<Router>) -> Result<StatusCode, ApiError> {
    router.clear_prompt_override().await?;
    Ok(StatusCode::NO_CONTENT)
}
