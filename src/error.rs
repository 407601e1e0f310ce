use crate::llm::ProviderKind;

/// Errors raised by the routing layer.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No credential is configured for the provider family a model needs.
    #[error("No credential configured for provider '{provider}'")]
    Configuration { provider: ProviderKind },

    /// The provider answered with a non-success status or an unreadable payload.
    #[error("{provider} request failed{}: {message}", fmt_status(.status))]
    Upstream {
        provider: ProviderKind,
        status: Option<u16>,
        message: String,
    },

    /// The inbound request itself is malformed.
    #[error("Invalid request: {0}")]
    Validation(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl RelayError {
    pub fn upstream(provider: ProviderKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider,
            status,
            message: message.into(),
        }
    }

    /// Short message suitable for a chat bubble or JSON error body.
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration { provider } => {
                format!("The {} provider is not configured", provider)
            }
            Self::Upstream { provider, .. } => format!("The {} provider request failed", provider),
            Self::Validation(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display_includes_status() {
        let err = RelayError::upstream(ProviderKind::Gemini, Some(503), "overloaded");
        assert_eq!(err.to_string(), "gemini request failed (HTTP 503): overloaded");

        let err = RelayError::upstream(ProviderKind::HostedInference, None, "bad json");
        assert_eq!(err.to_string(), "github-hosted request failed: bad json");
    }

    #[test]
    fn test_configuration_message() {
        let err = RelayError::Configuration {
            provider: ProviderKind::FastInference,
        };
        assert!(err.to_string().contains("groq"));
        assert_eq!(err.user_message(), "The groq provider is not configured");
    }
}
