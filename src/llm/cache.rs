use super::ChatMessage;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FINGERPRINT_MESSAGES: usize = 3;

const FIELD_SEPARATOR: &str = ":";
const MESSAGE_SEPARATOR: &str = "|";

#[derive(Debug, Clone)]
struct CacheEntry {
    response_text: String,
    cached_at: Instant,
}

type CacheKey = (String, String);

/// Short-lived memo of buffered responses.
///
/// Entries are keyed by model id and a fingerprint covering only the
/// trailing messages of the conversation. Expired entries are dropped when
/// their key is read, or by `clear`; there is no sweeper.
pub struct ResponseCache {
    ttl: Duration,
    fingerprint_messages: usize,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, fingerprint_messages: usize) -> Self {
        Self {
            ttl,
            fingerprint_messages: fingerprint_messages.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fingerprint of the trailing messages of a conversation.
    pub fn fingerprint(&self, messages: &[ChatMessage]) -> String {
        let start = messages.len().saturating_sub(self.fingerprint_messages);
        messages[start..]
            .iter()
            .map(|m| format!("{}{}{}", m.role, FIELD_SEPARATOR, m.content))
            .collect::<Vec<_>>()
            .join(MESSAGE_SEPARATOR)
    }

    fn key(&self, model_id: &str, messages: &[ChatMessage]) -> CacheKey {
        (model_id.to_string(), self.fingerprint(messages))
    }

    pub fn get(&self, model_id: &str, messages: &[ChatMessage]) -> Option<String> {
        let key = self.key(model_id, messages);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = entries.get(&key)?;
        if entry.cached_at.elapsed() < self.ttl {
            tracing::debug!(model = model_id, "Response cache hit");
            return Some(entry.response_text.clone());
        }

        entries.remove(&key);
        tracing::debug!(model = model_id, "Response cache entry expired");
        None
    }

    pub fn put(&self, model_id: &str, messages: &[ChatMessage], response_text: &str) {
        let key = self.key(model_id, messages);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            CacheEntry {
                response_text: response_text.to_string(),
                cached_at: Instant::now(),
            },
        );
    }

    /// Remove every entry, or only those of one model. Returns the number
    /// of entries removed.
    pub fn clear(&self, model_id: Option<&str>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();

        match model_id {
            Some(model) => entries.retain(|(entry_model, _), _| entry_model != model),
            None => entries.clear(),
        }

        let removed = before - entries.len();
        tracing::info!(model = ?model_id, removed, "Response cache cleared");
        removed
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_FINGERPRINT_MESSAGES)
    }
}
