use crate::error::RelayError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Rate limit exceeded (429)
    RateLimited {
        limit: u32,
        remaining: u32,
        /// Window end, epoch milliseconds
        reset_at: i64,
        retry_after: u64,
    },

    /// Internal server error (500)
    Internal { error: String, details: String },
}

impl ApiError {
    pub fn internal(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Internal {
            error: error.into(),
            details: details.into(),
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error message
    pub fn message(&self) -> String {
        match self {
            Self::BadRequest(msg) => msg.clone(),
            Self::RateLimited { .. } => "Too many requests".to_string(),
            Self::Internal { error, .. } => error.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Self::BadRequest(msg) => json!({ "error": msg }),
            Self::RateLimited {
                limit,
                remaining,
                reset_at,
                retry_after,
            } => json!({
                "error": self.message(),
                "limit": limit,
                "remaining": remaining,
                "resetAt": reset_at,
                "retryAfter": retry_after,
            }),
            Self::Internal { error, details } => json!({
                "error": error,
                "details": details,
            }),
        };

        let mut response = (status, axum::Json(body)).into_response();

        if let Self::RateLimited { retry_after, .. } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }

        response
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Validation(msg) => Self::BadRequest(msg),
            other => {
                tracing::error!("Chat request failed: {}", other);
                Self::internal(other.user_message(), other.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", err);
        Self::internal("Internal server error", format!("{:#}", err))
    }
}
