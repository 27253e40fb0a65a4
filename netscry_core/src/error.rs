//! Error types for netscry_core
//!
//! One unified error enum for the engine and every provider adapter.

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Provider config source unreadable or malformed. Fatal before any
    /// provider is contacted.
    #[error("config error: {0}")]
    Config(String),

    /// A selected provider is missing one of its required secret fields.
    /// Fatal for that provider only; no request is ever issued for it.
    #[error("provider '{provider}' missing credential field '{field}'")]
    Credential {
        provider: &'static str,
        field: &'static str,
    },

    /// Transport-level failure. Retried under the backoff controller.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider signaled throttling (HTTP 429 or an in-band marker).
    #[error("provider '{provider}' rate limited")]
    RateLimited { provider: &'static str },

    /// Provider rejected the credential (HTTP 401/403). Terminal for the
    /// provider, not retried.
    #[error("provider '{provider}' rejected authentication: {status}")]
    AuthRejected {
        provider: &'static str,
        status: u16,
    },

    /// Response body did not match the provider's schema. The affected page
    /// yields zero records; pagination may continue.
    #[error("provider '{provider}' returned an unparseable page: {message}")]
    Protocol {
        provider: &'static str,
        message: String,
    },

    /// Upstream returned a non-success status outside the retryable set.
    #[error("provider '{provider}' returned HTTP {status}")]
    UpstreamStatus {
        provider: &'static str,
        status: u16,
    },

    /// No provider in the request resolved to a runnable state.
    #[error("no usable provider: {0}")]
    NoProviders(String),

    /// Every selected provider ended in failure or was skipped.
    #[error("all providers failed: {0}")]
    AggregateFailure(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The run-scoped cancellation token fired while this provider was
    /// waiting. Not a failure; the driver stops cleanly.
    #[error("run cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the backoff controller may retry the request that produced
    /// this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Http(_)
                | EngineError::RateLimited { .. }
                | EngineError::UpstreamStatus { status: 500..=599, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_error_names_the_field() {
        let err = EngineError::Credential {
            provider: "google",
            field: "engine_id",
        };
        assert_eq!(
            err.to_string(),
            "provider 'google' missing credential field 'engine_id'"
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(EngineError::RateLimited { provider: "shodan" }.is_retryable());
        assert!(EngineError::UpstreamStatus { provider: "fofa", status: 502 }.is_retryable());
        assert!(!EngineError::UpstreamStatus { provider: "fofa", status: 404 }.is_retryable());
        assert!(!EngineError::AuthRejected { provider: "censys", status: 401 }.is_retryable());
        assert!(!EngineError::Credential { provider: "google", field: "api_key" }.is_retryable());
    }
}
