//! Authentication error types.

use alog_core::StorageError;

use crate::federation::IdpError;
use crate::oauth::PkceError;
use crate::token::JwtError;

/// Errors produced by the authentication layer.
///
/// Client-facing variants map one-to-one onto HTTP statuses in
/// [`crate::middleware::error`]. Provider, storage and internal failures are
/// logged there and surfaced as a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing or malformed request input.
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Missing, invalid or expired credential.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// The authorization state is unknown, already used or expired.
    #[error("Invalid or expired authorization state")]
    InvalidState,

    /// Authenticated but not permitted.
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Signup for an account that already exists.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// The identity provider call failed.
    #[error("Identity provider error: {0}")]
    IdentityProvider(#[from] IdpError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AuthError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` for errors caused by the client's request.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BadRequest { .. }
                | Self::Unauthorized { .. }
                | Self::InvalidState
                | Self::Forbidden { .. }
                | Self::NotFound { .. }
                | Self::Conflict { .. }
        )
    }

    /// Returns `true` for missing or rejected credentials.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::InvalidState)
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { entity, .. } => {
                Self::conflict(format!("{entity} already exists"))
            }
            other => Self::Storage(other),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::EncodingError { message } | JwtError::InvalidKey { message } => {
                Self::internal(message)
            }
            other => Self::unauthorized(other.to_string()),
        }
    }
}

impl From<PkceError> for AuthError {
    fn from(err: PkceError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(AuthError::bad_request("x").is_client_error());
        assert!(AuthError::InvalidState.is_client_error());
        assert!(AuthError::conflict("x").is_client_error());
        assert!(!AuthError::internal("x").is_client_error());
        assert!(!AuthError::Storage(StorageError::backend("down")).is_client_error());
    }

    #[test]
    fn test_storage_conflict_becomes_conflict() {
        let err: AuthError = StorageError::conflict("user", 1).into();
        assert!(matches!(err, AuthError::Conflict { .. }));

        let err: AuthError = StorageError::backend("down").into();
        assert!(matches!(err, AuthError::Storage(_)));
    }

    #[test]
    fn test_jwt_errors_are_unauthorized() {
        let err: AuthError = JwtError::Expired.into();
        assert!(err.is_unauthorized());

        let err: AuthError = JwtError::invalid_key("short").into();
        assert!(matches!(err, AuthError::Internal { .. }));
    }
}
