pub mod error;
pub mod rate_limit;
pub mod response;
pub mod routes;

use crate::core::Router;
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;
pub use rate_limit::{client_identity, RateLimitDecision, RateLimiter};
pub use response::*;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// HTTP surface of the relay
pub struct WebApiAdapter {
    router: Router,
    limiter: Arc<RateLimiter>,
    host: String,
    port: u16,
    cors_origins: Vec<String>,
}

impl WebApiAdapter {
    pub fn new(router: Router, limiter: Arc<RateLimiter>, host: String, port: u16) -> Self {
        Self {
            router,
            limiter,
            host,
            port,
            cors_origins: Vec::new(),
        }
    }

    /// Restrict browser callers to these origins (default: any)
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();

        let allow_origin = if origins.is_empty() {
            AllowOrigin::from(Any)
        } else {
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(Any)
    }

    /// Build Axum router with all endpoints
    pub fn router(&self) -> AxumRouter {
        // Only chat traffic counts against the rate limit
        let chat_routes = AxumRouter::new()
            .route("/chat", post(routes::chat))
            .route_layer(axum::middleware::from_fn_with_state(
                self.limiter.clone(),
                rate_limit::rate_limit_middleware,
            ));

        let admin_routes = AxumRouter::new()
            .route("/models", get(routes::list_models))
            .route("/cache", axum::routing::delete(routes::clear_cache))
            .route(
                "/prompt",
                get(routes::get_prompt)
                    .put(routes::set_prompt)
                    .delete(routes::clear_prompt),
            );

        AxumRouter::new()
            .route("/health", get(health_handler))
            .merge(chat_routes)
            .merge(admin_routes)
            .with_state(self.router.clone())
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(self.cors_layer())
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn(logging_middleware))
    }

    /// Serve until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let addr = format!("{}:{}", self.host, self.port);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("Listening on http://{} (POST /chat, GET /health)", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;

        Ok(())
    }
}

/// Health check handler
async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            service: "chatrelay".to_string(),
        }),
    )
}

/// Logging middleware
async fn logging_middleware(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        "{} {} -> {} ({} ms)",
        method,
        uri,
        response.status(),
        started.elapsed().as_millis()
    );

    response
}
