use crate::config::Config;
use crate::core::prompt::{FilePromptStore, PromptInjector, PromptOverrideStore};
use crate::error::RelayError;
use crate::llm::{
    ChatMessage, ChatRequest, ChatResponse, ClientPool, ModelCatalog, ModelDescriptor,
    ParameterResolver, ResponseCache, RoutingCore, StreamCallbacks,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Entry point for chat traffic: resolves the model and hands the
/// conversation to the routing core.
#[derive(Clone)]
pub struct Router {
    core: Arc<RoutingCore>,
    default_model: String,
}

impl Router {
    pub fn new(core: Arc<RoutingCore>, default_model: impl Into<String>) -> Self {
        Self {
            core,
            default_model: default_model.into(),
        }
    }

    /// Build the routing stack with the file-backed prompt override store.
    pub fn from_config(config: &Config) -> Self {
        let store = Arc::new(FilePromptStore::new(&config.prompts.override_path));
        Self::with_prompt_store(config, store)
    }

    /// Build the routing stack around an explicit prompt override store.
    pub fn with_prompt_store(config: &Config, store: Arc<dyn PromptOverrideStore>) -> Self {
        let catalog = Arc::new(ModelCatalog::with_custom(config.models.custom.clone()));
        let params = ParameterResolver::with_overrides(config.models.parameters.clone());
        let prompts = PromptInjector::new(catalog.clone(), config.prompts.unified.clone(), store);
        let pool = Arc::new(ClientPool::new(config.providers.clone(), catalog.clone()));
        let cache = Arc::new(ResponseCache::new(
            Duration::from_secs(config.cache.ttl_secs),
            config.cache.fingerprint_messages,
        ));

        let core = RoutingCore::new(catalog, params, prompts, pool, cache)
            .with_model_overrides(config.models.overrides.clone());

        tracing::debug!(
            "Router initialized: {} models, default '{}'",
            core.catalog().len(),
            config.models.default
        );

        Self::new(Arc::new(core), config.models.default.clone())
    }

    pub fn core(&self) -> &Arc<RoutingCore> {
        &self.core
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Requested model, or the default when none (or a blank id) was given.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
            .to_string()
    }

    pub async fn handle_chat(
        &self,
        model: Option<&str>,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatResponse, RelayError> {
        let request = ChatRequest::new(self.resolve_model(model), messages);
        self.core.complete(&request).await
    }

    pub async fn handle_chat_stream(
        &self,
        model: Option<&str>,
        messages: Vec<ChatMessage>,
        callbacks: &mut dyn StreamCallbacks,
    ) -> Result<ChatResponse, RelayError> {
        let request = ChatRequest::new(self.resolve_model(model), messages);
        self.core.stream(&request, callbacks).await
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        self.core.catalog().models()
    }

    /// Remove cached responses, for one model or all of them.
    pub fn clear_cache(&self, model: Option<&str>) -> usize {
        let removed = self.core.cache().clear(model);
        tracing::info!("Cleared {} cached responses (model: {:?})", removed, model);
        removed
    }

    pub async fn prompt_override(&self) -> Result<Option<String>> {
        self.core.prompts().overrides().get().await
    }

    pub async fn set_prompt_override(&self, prompt: &str) -> Result<()> {
        self.core.prompts().overrides().set(prompt).await
    }

    pub async fn clear_prompt_override(&self) -> Result<()> {
        self.core.prompts().overrides().clear().await
    }

    /// Release pooled provider clients.
    pub fn shutdown(&self) {
        self.core.pool().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prompt::MemoryPromptStore;

    fn router() -> Router {
        Router::with_prompt_store(&Config::default(), Arc::new(MemoryPromptStore::new()))
    }

    #[test]
    fn test_model_fallback() {
        let router = router();
        assert_eq!(router.resolve_model(None), "gpt-4o-mini");
        assert_eq!(router.resolve_model(Some("  ")), "gpt-4o-mini");
        assert_eq!(router.resolve_model(Some("gemini-flash")), "gemini-flash");
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        let router = router();
        let err = router
            .handle_chat(Some("llama-3.1-8b-instant"), vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_prompt_override_roundtrip() {
        let router = router();
        assert_eq!(router.prompt_override().await.unwrap(), None);

        router.set_prompt_override("short answers").await.unwrap();
        assert_eq!(
            router.prompt_override().await.unwrap().as_deref(),
            Some("short answers")
        );

        router.clear_prompt_override().await.unwrap();
        assert_eq!(router.prompt_override().await.unwrap(), None);
    }
}
