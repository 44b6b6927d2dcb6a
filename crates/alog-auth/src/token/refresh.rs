//! Single-use refresh tokens.
//!
//! A token is `hex(SHA-512(64 random bytes))`. The stored value is both the
//! lookup key and the credential. Consuming a token deletes it before any
//! other check, so a token can never be honored twice.

use alog_core::{DynRefreshTokenStorage, RefreshToken, UserId};
use sha2::{Digest, Sha512};
use time::{Duration, OffsetDateTime};

use crate::error::{AuthError, AuthResult};
use crate::random::random_bytes;

/// Generates a new refresh token value (128 hex characters).
#[must_use]
pub fn generate_refresh_token() -> String {
    hex::encode(Sha512::digest(random_bytes(64)))
}

/// Issues and consumes refresh tokens.
pub struct RefreshTokenService {
    storage: DynRefreshTokenStorage,
    lifetime: Duration,
}

impl RefreshTokenService {
    #[must_use]
    pub fn new(storage: DynRefreshTokenStorage, lifetime: Duration) -> Self {
        Self { storage, lifetime }
    }

    /// Issues and stores a new token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored.
    pub async fn issue(&self, user_id: UserId) -> AuthResult<RefreshToken> {
        let now = OffsetDateTime::now_utc();
        let token = RefreshToken {
            token: generate_refresh_token(),
            user_id,
            issued_at: now,
            expires_at: now + self.lifetime,
        };
        self.storage.create(&token).await?;
        Ok(token)
    }

    /// Removes `token` from storage and returns it if it was still valid.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthorized` if the token is unknown, already
    /// consumed or expired. All three read the same to the caller.
    pub async fn consume(&self, token: &str) -> AuthResult<RefreshToken> {
        let record = self
            .storage
            .take(token)
            .await?
            .ok_or_else(|| AuthError::unauthorized("invalid refresh token"))?;

        if record.is_expired() {
            tracing::debug!(user_id = record.user_id, "expired refresh token presented");
            return Err(AuthError::unauthorized("invalid refresh token"));
        }
        Ok(record)
    }

    /// Deletes `token` if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error only if storage fails.
    pub async fn revoke(&self, token: &str) -> AuthResult<()> {
        self.storage.take(token).await?;
        Ok(())
    }

    /// Deletes every token of `user_id`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error only if storage fails.
    pub async fn revoke_all(&self, user_id: UserId) -> AuthResult<u64> {
        Ok(self.storage.delete_by_user(user_id).await?)
    }
}
