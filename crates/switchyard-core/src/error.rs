//! Error types for the routing layer.
//!
//! These never escape [`LlmProvider::chat`](crate::provider::LlmProvider::chat):
//! the router folds every variant into an `LlmResponse` with
//! `finish_reason == "error"`. They exist so the planning, transport and
//! parsing stages can use `?` internally.

use thiserror::Error;

/// Failure while routing or performing a chat completion.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No provider has a usable API key for the requested model.
    #[error("no LLM provider configured for model '{model}' (set an apiKey under providers in the config)")]
    NotConfigured { model: String },

    /// The upstream rejected the credentials (HTTP 401 or an "unauthorized" message).
    #[error(
        "authentication failed for {provider}: {message}. Re-authenticate or update the API key for this provider"
    )]
    Unauthorized { provider: String, message: String },

    /// Non-success HTTP status from the upstream.
    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Network-level failure (connect, TLS, body read).
    #[error("{0}")]
    Transport(String),

    /// The outbound payload could not be assembled.
    #[error("failed to build request: {0}")]
    Request(String),

    /// The upstream answered 2xx but the body was not a usable completion.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Status phrasings of a 401. A bare "401" is not enough: it shows up in
/// ports and URLs.
const AUTH_STATUS_PHRASES: &[&str] = &["(401", "status 401", "status: 401", "http 401", "error 401"];

/// Whether an upstream or network message reports an HTTP 401.
fn mentions_auth_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("unauthorized") || AUTH_STATUS_PHRASES.iter().any(|p| lower.contains(p))
}

impl LlmError {
    /// Classify a non-success upstream reply, promoting auth failures.
    pub fn from_status(provider: &str, status: u16, message: String) -> Self {
        if status == 401 || mentions_auth_failure(&message) {
            Self::unauthorized(provider, message)
        } else {
            Self::Api { status, message }
        }
    }

    /// Classify a network-level failure, promoting auth failures.
    pub fn from_transport(provider: &str, message: String) -> Self {
        if mentions_auth_failure(&message) {
            Self::unauthorized(provider, message)
        } else {
            Self::Transport(message)
        }
    }

    fn unauthorized(provider: &str, message: String) -> Self {
        Self::Unauthorized {
            provider: provider.to_string(),
            message,
        }
    }

    /// Whether the remedy is re-authentication rather than retrying.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_401_is_auth() {
        let err = LlmError::from_status("openai", 401, "Incorrect API key provided".into());
        assert!(err.is_auth());
        assert!(err.to_string().contains("Re-authenticate"));
    }

    #[test]
    fn test_unauthorized_message_is_auth() {
        let err = LlmError::from_status("groq", 403, "Unauthorized: token expired".into());
        assert!(err.is_auth());
    }

    #[test]
    fn test_transport_message_classification() {
        let err = LlmError::from_transport(
            "openrouter",
            "HTTP status client error (401 Unauthorized) for url (https://openrouter.ai/api/v1/chat/completions)".into(),
        );
        assert!(err.is_auth());
        assert!(err.to_string().starts_with("authentication failed for openrouter"));

        let err = LlmError::from_transport("groq", "upstream returned status 401".into());
        assert!(err.is_auth());

        let err = LlmError::from_transport(
            "openai",
            "error sending request for url (http://127.0.0.1:40123/v1/chat/completions)".into(),
        );
        assert!(!err.is_auth());
        assert!(matches!(err, LlmError::Transport(_)));
    }

    #[test]
    fn test_other_status_is_api_error() {
        let err = LlmError::from_status("openai", 500, "boom".into());
        assert!(!err.is_auth());
        assert_eq!(err.to_string(), "LLM API error (500): boom");
    }
}
