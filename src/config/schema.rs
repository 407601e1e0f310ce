use crate::llm::{ModelDescriptor, ModelParameters};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_HOSTED_ENDPOINT: &str = "https://models.inference.ai.azure.com";
pub const DEFAULT_FAST_ENDPOINT: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed to call the API from a browser; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Endpoint and credential of one provider family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

impl ProviderEndpoint {
    pub fn endpoint_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or(fallback)
            .trim_end_matches('/')
    }

    /// Configured credential, if present and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub hosted: ProviderEndpoint,
    #[serde(default)]
    pub fast: ProviderEndpoint,
    #[serde(default)]
    pub gemini: ProviderEndpoint,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            hosted: ProviderEndpoint::default(),
            fast: ProviderEndpoint::default(),
            gemini: ProviderEndpoint::default(),
            retry: RetryConfig::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_model")]
    pub default: String,
    /// Model id → id sent upstream
    #[serde(default)]
    pub overrides: HashMap<String, String>,
    /// Per-model generation parameters layered over the built-in table
    #[serde(default)]
    pub parameters: HashMap<String, ModelParameters>,
    /// Extra catalog entries
    #[serde(default)]
    pub custom: Vec<ModelDescriptor>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            overrides: HashMap::new(),
            parameters: HashMap::new(),
            custom: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_fingerprint_messages")]
    pub fingerprint_messages: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            fingerprint_messages: default_fingerprint_messages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit")]
    pub limit: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_rate_limit(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_unified_prompt")]
    pub unified: String,
    /// File holding the user-set system prompt override
    #[serde(default = "default_override_path")]
    pub override_path: PathBuf,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            unified: default_unified_prompt(),
            override_path: default_override_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    300
}

fn default_max_backoff_ms() -> u64 {
    2000
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    5 * 60
}

fn default_fingerprint_messages() -> usize {
    3
}

fn default_rate_limit() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

pub(crate) fn default_unified_prompt() -> String {
    "You are a helpful, friendly assistant. Answer clearly and concisely.".to_string()
}

fn default_override_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".chatrelay").join("prompt_override.json"))
        .unwrap_or_else(|| PathBuf::from("./prompt_override.json"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
