use super::catalog::{ModelCatalog, ProviderKind};
use super::providers::upstream_error_message;
use crate::config::{
    ProviderEndpoint, ProvidersConfig, RetryConfig, DEFAULT_FAST_ENDPOINT,
    DEFAULT_GEMINI_ENDPOINT, DEFAULT_HOSTED_ENDPOINT,
};
use crate::error::RelayError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry schedule for transient upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before the given retry (1-based), doubling up to the cap.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Total time spent sleeping if every retry is used.
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_retries).map(|r| self.delay_for(r)).sum()
    }

    pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
        status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Authenticated transport bound to one provider endpoint and credential.
pub struct ProviderClient {
    kind: ProviderKind,
    endpoint: String,
    credential: String,
    api_version: Option<String>,
    http: reqwest::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("credential", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ProviderClient {
    pub fn new(
        kind: ProviderKind,
        endpoint: &str,
        credential: &str,
        api_version: Option<String>,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                RelayError::upstream(kind, None, format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            kind,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credential: credential.to_string(),
            api_version,
            http,
            retry,
            request_timeout,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Upper bound for buffered (non-streaming) calls.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Send a raw request, retrying network failures, 429 and 5xx responses.
    ///
    /// `build` is called once per attempt. Non-success responses that are not
    /// retried become [`RelayError::Upstream`] with the upstream's message.
    pub async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, RelayError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                let delay = self.retry.delay_for(attempt);
                warn!(
                    provider = %self.kind,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying upstream request"
                );
                tokio::time::sleep(delay).await;
            }
            let retries_left = attempt < self.retry.max_retries;

            match build(&self.http).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if RetryPolicy::is_retryable_status(status) && retries_left {
                        warn!(provider = %self.kind, status = %status, "Transient upstream error, will retry");
                        attempt += 1;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(RelayError::upstream(
                        self.kind,
                        Some(status.as_u16()),
                        upstream_error_message(&body),
                    ));
                }
                Err(e) => {
                    if retries_left {
                        warn!(provider = %self.kind, error = %e, "Network error calling upstream");
                        attempt += 1;
                        continue;
                    }
                    return Err(RelayError::upstream(self.kind, None, e.to_string()));
                }
            }
        }
    }
}

/// Lazily built provider clients, one per model id.
pub struct ClientPool {
    providers: ProvidersConfig,
    catalog: Arc<ModelCatalog>,
    clients: Mutex<HashMap<String, Arc<ProviderClient>>>,
}

impl ClientPool {
    pub fn new(providers: ProvidersConfig, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            providers,
            catalog,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn provider_settings(&self, kind: ProviderKind) -> (&ProviderEndpoint, &'static str) {
        match kind {
            ProviderKind::HostedInference => (&self.providers.hosted, DEFAULT_HOSTED_ENDPOINT),
            ProviderKind::FastInference => (&self.providers.fast, DEFAULT_FAST_ENDPOINT),
            ProviderKind::Gemini => (&self.providers.gemini, DEFAULT_GEMINI_ENDPOINT),
        }
    }

    /// Whether the provider family has a credential configured.
    pub fn has_credential(&self, kind: ProviderKind) -> bool {
        self.provider_settings(kind).0.credential().is_some()
    }

    /// Return the pooled client for a model, building it on first use.
    ///
    /// Fails with [`RelayError::Configuration`] when the model's provider
    /// family has no credential.
    pub fn get_or_create_client(&self, model_id: &str) -> Result<Arc<ProviderClient>, RelayError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(client) = clients.get(model_id) {
            return Ok(client.clone());
        }

        let kind = self.catalog.provider_for(model_id);
        let (settings, default_endpoint) = self.provider_settings(kind);
        let credential = settings
            .credential()
            .ok_or(RelayError::Configuration { provider: kind })?;

        let client = Arc::new(ProviderClient::new(
            kind,
            settings.endpoint_or(default_endpoint),
            credential,
            settings.api_version.clone(),
            RetryPolicy::from(&self.providers.retry),
            Duration::from_secs(self.providers.request_timeout_secs),
        )?);

        info!(model = model_id, provider = %kind, endpoint = client.endpoint(), "Created provider client");
        clients.insert(model_id.to_string(), client.clone());
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pooled client.
    pub fn clear(&self) {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(count = clients.len(), "Releasing provider clients");
        clients.clear();
    }
}
