//! Routing core: picks the provider handler for a model, runs the request
//! buffered or streamed, and normalizes whatever comes back.

use super::cache::ResponseCache;
use super::catalog::{ModelCatalog, ProviderKind};
use super::params::ParameterResolver;
use super::pool::ClientPool;
use super::providers::{
    FastInferenceHandler, GeminiHandler, HostedInferenceHandler, ProviderHandler, ProviderRequest,
};
use super::reasoning::{split_reasoning, ThinkParser};
use super::stream::{StreamCallbacks, TokenSink};
use super::{ChatRequest, ChatResponse, EMPTY_RESPONSE_PLACEHOLDER};
use crate::core::prompt::PromptInjector;
use crate::error::RelayError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle of one routed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Idle,
    Dispatching,
    BufferedFetch,
    StreamFetch,
    Normalizing,
    Done,
    Errored,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("illegal route transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: RouteState,
    pub to: RouteState,
}

impl RouteState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RouteState::Done | RouteState::Errored)
    }

    pub fn transition(self, to: RouteState) -> Result<RouteState, IllegalTransition> {
        use RouteState::*;

        let legal = match (self, to) {
            (Idle, Dispatching)
            | (Dispatching, BufferedFetch)
            | (Dispatching, StreamFetch)
            | (BufferedFetch, Normalizing)
            | (StreamFetch, Normalizing)
            | (Normalizing, Done) => true,
            (from, Errored) => from != Idle && !from.is_terminal(),
            _ => false,
        };

        if legal {
            Ok(to)
        } else {
            Err(IllegalTransition { from: self, to })
        }
    }
}

/// Per-request state holder that logs each step.
struct RouteTrace<'a> {
    id: Uuid,
    model: &'a str,
    state: RouteState,
}

impl<'a> RouteTrace<'a> {
    fn new(model: &'a str) -> Self {
        Self {
            id: Uuid::new_v4(),
            model,
            state: RouteState::Idle,
        }
    }

    fn advance(&mut self, to: RouteState) {
        match self.state.transition(to) {
            Ok(next) => {
                debug!(
                    request_id = %self.id,
                    model = self.model,
                    from = ?self.state,
                    to = ?next,
                    "Route transition"
                );
                self.state = next;
            }
            Err(e) => error!(request_id = %self.id, model = self.model, "{}", e),
        }
    }
}

/// Sits between a provider handler and the caller's callbacks, keeping
/// think blocks out of the visible token stream.
struct StreamDriver<'a> {
    parser: ThinkParser,
    callbacks: &'a mut dyn StreamCallbacks,
    visible: String,
}

impl StreamDriver<'_> {
    fn emit(&mut self, text: &str) {
        if !text.is_empty() {
            self.callbacks.on_token(text);
            self.visible.push_str(text);
        }
    }
}

impl TokenSink for StreamDriver<'_> {
    fn push(&mut self, chunk: &str) {
        let visible = self.parser.push(chunk);
        self.emit(&visible);
    }
}

pub struct RoutingCore {
    catalog: Arc<ModelCatalog>,
    params: ParameterResolver,
    prompts: PromptInjector,
    pool: Arc<ClientPool>,
    cache: Arc<ResponseCache>,
    model_overrides: HashMap<String, String>,
    fast: Box<dyn ProviderHandler>,
    gemini: Box<dyn ProviderHandler>,
    hosted: Box<dyn ProviderHandler>,
}

impl RoutingCore {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        params: ParameterResolver,
        prompts: PromptInjector,
        pool: Arc<ClientPool>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            catalog,
            params,
            prompts,
            pool,
            cache,
            model_overrides: HashMap::new(),
            fast: Box::new(FastInferenceHandler::new()),
            gemini: Box::new(GeminiHandler::new()),
            hosted: Box::new(HostedInferenceHandler::new()),
        }
    }

    /// Map catalog ids to different upstream ids, e.g. `gpt-4o -> openai/gpt-4o`.
    pub fn with_model_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.model_overrides = overrides;
        self
    }

    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    pub fn prompts(&self) -> &PromptInjector {
        &self.prompts
    }

    fn handler(&self, kind: ProviderKind) -> &dyn ProviderHandler {
        match kind {
            ProviderKind::FastInference => self.fast.as_ref(),
            ProviderKind::Gemini => self.gemini.as_ref(),
            ProviderKind::HostedInference => self.hosted.as_ref(),
        }
    }

    async fn provider_request(&self, request: &ChatRequest) -> ProviderRequest {
        let model = self
            .model_overrides
            .get(&request.model)
            .cloned()
            .unwrap_or_else(|| request.model.clone());

        ProviderRequest {
            model,
            messages: request.messages.clone(),
            system_prompt: self.prompts.resolve_system_prompt(&request.model).await,
            params: self.params.resolve_parameters(&request.model),
            reasoning_capable: self.catalog.is_reasoning_capable(&request.model),
        }
    }

    async fn dispatch(
        &self,
        request: &ChatRequest,
        trace: &mut RouteTrace<'_>,
        sink: Option<&mut dyn TokenSink>,
    ) -> Result<String, RelayError> {
        let kind = self.catalog.provider_for(&request.model);
        // Credential check happens here, before any network call.
        let client = self.pool.get_or_create_client(&request.model)?;
        let provider_request = self.provider_request(request).await;

        trace.advance(if sink.is_some() {
            RouteState::StreamFetch
        } else {
            RouteState::BufferedFetch
        });
        debug!(
            model = %request.model,
            upstream_model = %provider_request.model,
            provider = %kind,
            messages = request.messages.len(),
            "Dispatching request"
        );

        self.handler(kind)
            .handle(&client, &provider_request, sink)
            .await
    }

    /// Buffered completion, served from the response cache when possible.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, RelayError> {
        if let Some(raw) = self.cache.get(&request.model, &request.messages) {
            let (content, reasoning) = split_reasoning(&raw);
            return Ok(ChatResponse {
                content: content.trim().to_string(),
                reasoning,
                model: request.model.clone(),
                cached: true,
            });
        }

        let started = Instant::now();
        let mut trace = RouteTrace::new(&request.model);
        trace.advance(RouteState::Dispatching);

        let raw = match self.dispatch(request, &mut trace, None).await {
            Ok(raw) => raw,
            Err(e) => {
                trace.advance(RouteState::Errored);
                warn!(
                    request_id = %trace.id,
                    model = %request.model,
                    error = %e,
                    "Request failed"
                );
                return Err(e);
            }
        };

        trace.advance(RouteState::Normalizing);
        let (content, reasoning) = split_reasoning(&raw);
        let content = content.trim();
        let content = if content.is_empty() {
            debug!(model = %request.model, "Empty upstream response");
            EMPTY_RESPONSE_PLACEHOLDER.to_string()
        } else {
            self.cache.put(&request.model, &request.messages, &raw);
            content.to_string()
        };
        trace.advance(RouteState::Done);

        info!(
            model = %request.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            reasoning = reasoning.is_some(),
            "Completed request"
        );

        Ok(ChatResponse {
            content,
            reasoning,
            model: request.model.clone(),
            cached: false,
        })
    }

    /// Streamed completion. Visible tokens reach `callbacks` in upstream
    /// order; failures are reported through `on_error` and returned.
    /// Streams bypass the response cache.
    pub async fn stream(
        &self,
        request: &ChatRequest,
        callbacks: &mut dyn StreamCallbacks,
    ) -> Result<ChatResponse, RelayError> {
        let started = Instant::now();
        let mut trace = RouteTrace::new(&request.model);
        trace.advance(RouteState::Dispatching);
        callbacks.on_start();

        let mut driver = StreamDriver {
            parser: ThinkParser::new(),
            callbacks,
            visible: String::new(),
        };

        let result = self
            .dispatch(request, &mut trace, Some(&mut driver as &mut dyn TokenSink))
            .await;
        if let Err(e) = result {
            trace.advance(RouteState::Errored);
            warn!(
                request_id = %trace.id,
                model = %request.model,
                error = %e,
                "Stream failed"
            );
            driver.callbacks.on_error(&e);
            return Err(e);
        }

        trace.advance(RouteState::Normalizing);
        let parser = std::mem::take(&mut driver.parser);
        let output = parser.finish();
        driver.emit(&output.trailing_visible);

        let mut content = driver.visible.trim().to_string();
        if content.is_empty() {
            content = EMPTY_RESPONSE_PLACEHOLDER.to_string();
            driver.callbacks.on_token(&content);
        }
        driver
            .callbacks
            .on_complete(&content, output.reasoning.as_deref());
        trace.advance(RouteState::Done);

        info!(
            model = %request.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Completed stream"
        );

        Ok(ChatResponse {
            content,
            reasoning: output.reasoning,
            model: request.model.clone(),
            cached: false,
        })
    }
}
