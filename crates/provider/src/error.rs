use std::time::Duration;

/// Errors from the preview and entitlement services.
///
/// Classification into user-facing failure kinds happens in the engine;
/// this type only records what went wrong on the wire.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The caller cancelled the request.
    #[error("Request aborted")]
    Aborted,

    /// No response within the caller's deadline.
    #[error("Request timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("Invalid provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, ProviderError::Aborted)
    }

    /// HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            ProviderError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Network failures, timeouts, and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::TimedOut(_) | ProviderError::Request(_) => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::Aborted | ProviderError::Decode(_) => false,
        }
    }
}
