//! Fixed-window request limiting per caller.

use super::error::ApiError;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

const UNKNOWN_CLIENT: &str = "unknown";

/// Headers consulted for the caller address, first match wins.
const IDENTITY_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window ends
    pub reset_after: Duration,
    /// Whole seconds to wait before retrying, zero when allowed
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    /// Wall-clock end of the window, as epoch milliseconds.
    pub fn reset_at_millis(&self) -> i64 {
        let reset_after = chrono::Duration::from_std(self.reset_after)
            .unwrap_or_else(|_| chrono::Duration::zero());
        (chrono::Utc::now() + reset_after).timestamp_millis()
    }
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count a request against `key` and decide whether to admit it.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            reset_at: now + self.window,
        });
        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }
        entry.count = entry.count.saturating_add(1);

        let allowed = entry.count <= self.limit;
        let reset_after = entry.reset_at.saturating_duration_since(now);
        let retry_after_secs = if allowed {
            0
        } else {
            // Round up so a client never retries inside the window.
            reset_after.as_millis().div_ceil(1000).max(1) as u64
        };

        RateLimitDecision {
            allowed,
            limit: self.limit,
            remaining: self.limit.saturating_sub(entry.count),
            reset_after,
            retry_after_secs,
        }
    }

    /// Drop entries whose window has ended. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.reset_at > now);
        before - entries.len()
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

    /// Sweep expired entries every `interval` until the task is aborted.
    pub fn spawn_sweeper(limiter: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.sweep();
                if removed > 0 {
                    tracing::debug!("Rate limiter swept {} expired entries", removed);
                }
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW)
    }
}

/// Caller identity from proxy headers, or a shared bucket when absent.
pub fn client_identity(headers: &HeaderMap) -> String {
    IDENTITY_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let values = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_at_millis().to_string()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

/// Admission middleware for limited routes.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(request.headers());
    let decision = limiter.check(&identity);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(
            "Rate limit exceeded for {} (retry after {}s)",
            identity,
            decision.retry_after_secs
        );
        ApiError::RateLimited {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: decision.reset_at_millis(),
            retry_after: decision.retry_after_secs,
        }
        .into_response()
    };

    apply_headers(response.headers_mut(), &decision);
    response
}
