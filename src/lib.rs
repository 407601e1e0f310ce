pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod llm;

pub use config::Config;
pub use core::Router;
pub use error::RelayError;

use anyhow::Result;
use api::{RateLimiter, WebApiAdapter};
use std::sync::Arc;
use std::time::Duration;

pub async fn run(config: Config) -> Result<()> {
    tracing::info!("Starting chatrelay...");

    let router = Router::from_config(&config);
    tracing::info!(
        "Router initialized ({} models, default '{}')",
        router.models().len(),
        router.default_model()
    );

    for kind in [
        llm::ProviderKind::HostedInference,
        llm::ProviderKind::FastInference,
        llm::ProviderKind::Gemini,
    ] {
        if !router.core().pool().has_credential(kind) {
            tracing::warn!("No credential for {}; its models will fail", kind);
        }
    }

    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.limit,
        Duration::from_secs(config.rate_limit.window_secs),
    ));
    let sweeper = RateLimiter::spawn_sweeper(
        limiter.clone(),
        Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1)),
    );
    tracing::info!(
        "Rate limiter: {} requests per {}s",
        config.rate_limit.limit,
        config.rate_limit.window_secs
    );

    let api = WebApiAdapter::new(
        router.clone(),
        limiter,
        config.gateway.host.clone(),
        config.gateway.port,
    )
    .with_cors_origins(config.gateway.cors_origins.clone());

    let result = api.start(shutdown_signal()).await;

    sweeper.abort();
    router.shutdown();
    tracing::info!("chatrelay stopped");

    result
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}
