//! Error types for identity provider calls.

/// Errors that can occur while talking to the identity provider.
///
/// Response bodies are kept in the error for diagnostics. They are logged,
/// never returned to the end user.
#[derive(Debug, thiserror::Error)]
pub enum IdpError {
    /// The token endpoint answered with a non-success status.
    #[error("Token request failed: HTTP {status} - {body}")]
    TokenRequestFailed { status: u16, body: String },

    /// The userinfo endpoint answered with a non-success status.
    #[error("Userinfo request failed: HTTP {status} - {body}")]
    UserinfoFailed { status: u16, body: String },

    /// A response could not be interpreted.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// The client is misconfigured.
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    /// A network error occurred, including timeouts.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl IdpError {
    /// Returns `true` if the request timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::NetworkError(e) if e.is_timeout())
    }
}
