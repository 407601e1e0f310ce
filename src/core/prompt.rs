//! System prompt resolution
//!
//! The effective prompt for a model is, in order: the user-set override,
//! the catalog prompt for that model, then the unified default. The
//! override is read again on every request so edits apply immediately.

use crate::llm::ModelCatalog;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Persistent storage for the user-set prompt override.
#[async_trait]
pub trait PromptOverrideStore: Send + Sync {
    /// Current override, `None` when unset.
    async fn get(&self) -> Result<Option<String>>;

    async fn set(&self, prompt: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct OverrideFile {
    prompt: String,
}

/// Override kept in a small JSON file: `{"prompt": "..."}`
#[derive(Debug, Clone)]
pub struct FilePromptStore {
    path: PathBuf,
}

impl FilePromptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PromptOverrideStore for FilePromptStore {
    async fn get(&self) -> Result<Option<String>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read prompt override: {}", self.path.display())
                })
            }
        };

        let file: OverrideFile = serde_json::from_str(&contents).with_context(|| {
            format!("Failed to parse prompt override: {}", self.path.display())
        })?;
        Ok(Some(file.prompt))
    }

    async fn set(&self, prompt: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(&OverrideFile {
            prompt: prompt.to_string(),
        })?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write prompt override: {}", self.path.display()))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove prompt override: {}", self.path.display())
            }),
        }
    }
}

/// In-process override, used when no file is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryPromptStore {
    prompt: Mutex<Option<String>>,
}

impl MemoryPromptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PromptOverrideStore for MemoryPromptStore {
    async fn get(&self) -> Result<Option<String>> {
        Ok(self
            .prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn set(&self, prompt: &str) -> Result<()> {
        *self.prompt.lock().unwrap_or_else(PoisonError::into_inner) = Some(prompt.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.prompt.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Resolves the system prompt sent with each request.
#[derive(Clone)]
pub struct PromptInjector {
    catalog: Arc<ModelCatalog>,
    unified: String,
    overrides: Arc<dyn PromptOverrideStore>,
}

impl PromptInjector {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        unified: impl Into<String>,
        overrides: Arc<dyn PromptOverrideStore>,
    ) -> Self {
        Self {
            catalog,
            unified: unified.into(),
            overrides,
        }
    }

    pub fn overrides(&self) -> &Arc<dyn PromptOverrideStore> {
        &self.overrides
    }

    /// Never fails: an unreadable override is logged and skipped.
    pub async fn resolve_system_prompt(&self, model_id: &str) -> String {
        match self.overrides.get().await {
            Ok(Some(prompt)) if !prompt.trim().is_empty() => return prompt,
            Ok(_) => {}
            Err(e) => tracing::warn!("Ignoring prompt override: {:#}", e),
        }

        self.catalog
            .lookup_model(model_id)
            .and_then(|m| m.system_prompt.clone())
            .unwrap_or_else(|| self.unified.clone())
    }
}

impl std::fmt::Debug for PromptInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptInjector")
            .field("unified", &self.unified)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn injector(store: Arc<dyn PromptOverrideStore>) -> PromptInjector {
        PromptInjector::new(Arc::new(ModelCatalog::builtin()), "UNIFIED", store)
    }

    #[tokio::test]
    async fn test_precedence() {
        let store = Arc::new(MemoryPromptStore::new());
        let injector = injector(store.clone());

        // Catalog prompt for reasoning models, unified for the rest
        let reasoning = injector.resolve_system_prompt("DeepSeek-R1").await;
        assert_ne!(reasoning, "UNIFIED");
        assert_eq!(injector.resolve_system_prompt("gpt-4o").await, "UNIFIED");
        assert_eq!(injector.resolve_system_prompt("custom/model").await, "UNIFIED");

        store.set("Talk like a pirate").await.unwrap();
        assert_eq!(
            injector.resolve_system_prompt("DeepSeek-R1").await,
            "Talk like a pirate"
        );

        // Blank overrides do not count
        store.set("   ").await.unwrap();
        assert_eq!(injector.resolve_system_prompt("gpt-4o").await, "UNIFIED");

        store.clear().await.unwrap();
        assert_eq!(injector.resolve_system_prompt("DeepSeek-R1").await, reasoning);
    }

    #[tokio::test]
    async fn test_file_store_is_reread() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("prompt_override.json");
        let store = Arc::new(FilePromptStore::new(&path));
        let injector = injector(store.clone());

        assert_eq!(store.get().await.unwrap(), None);
        store.set("first").await.unwrap();
        assert_eq!(injector.resolve_system_prompt("gpt-4o").await, "first");

        // External edit between requests
        std::fs::write(&path, r#"{"prompt":"second"}"#).unwrap();
        assert_eq!(injector.resolve_system_prompt("gpt-4o").await, "second");

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(!path.exists());
        assert_eq!(injector.resolve_system_prompt("gpt-4o").await, "UNIFIED");
    }

    #[tokio::test]
    async fn test_corrupt_override_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prompt_override.json");
        std::fs::write(&path, "not json").unwrap();

        let store = Arc::new(FilePromptStore::new(&path));
        assert!(store.get().await.is_err());
        assert_eq!(injector(store).resolve_system_prompt("gpt-4o").await, "UNIFIED");
    }
}
