//! Persistence gateway errors.

/// Errors returned by persistence gateway implementations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique constraint was violated.
    #[error("{entity} already exists: {id}")]
    Conflict { entity: &'static str, id: String },

    /// The input cannot be stored as given.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The backend failed (connection, query, serialization).
    #[error("Storage backend error: {message}")]
    Backend { message: String },
}

impl StorageError {
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn conflict(entity: &'static str, id: impl ToString) -> Self {
        Self::Conflict {
            entity,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Returns `true` for [`StorageError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`StorageError::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("user", 42);
        assert_eq!(err.to_string(), "user not found: 42");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());

        let err = StorageError::conflict("refresh_token", "abc");
        assert_eq!(err.to_string(), "refresh_token already exists: abc");
        assert!(err.is_conflict());
    }
}
