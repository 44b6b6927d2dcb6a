//! Access/refresh token pairs.

use std::sync::Arc;

use alog_core::{DynUserStorage, User};
use time::OffsetDateTime;

use super::jwt::{AccessTokenClaims, TokenSigner};
use super::refresh::RefreshTokenService;
use crate::error::{AuthError, AuthResult};

/// A signed access token with its refresh token.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: OffsetDateTime,
    pub refresh_token: String,
    pub refresh_expires_at: OffsetDateTime,
}

/// Issues, verifies and rotates credentials for local users.
pub struct CredentialService {
    signer: Arc<TokenSigner>,
    refresh_tokens: RefreshTokenService,
    users: DynUserStorage,
}

impl CredentialService {
    #[must_use]
    pub fn new(
        signer: Arc<TokenSigner>,
        refresh_tokens: RefreshTokenService,
        users: DynUserStorage,
    ) -> Self {
        Self {
            signer,
            refresh_tokens,
            users,
        }
    }

    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Signs an access token and issues a refresh token for `user`.
    ///
    /// # Errors
    ///
    /// Fails if signing fails or the refresh token cannot be stored.
    pub async fn issue_pair(&self, user: &User) -> AuthResult<TokenPair> {
        let signed = self.signer.sign(user)?;
        let refresh = self.refresh_tokens.issue(user.id).await?;
        Ok(TokenPair {
            access_token: signed.token,
            access_expires_at: signed.expires_at,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
        })
    }

    /// Verifies an access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthorized` for any invalid or expired token.
    pub fn verify(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        self.signer.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "access token rejected");
            AuthError::from(e)
        })
    }

    /// Consumes `refresh_token` and issues a new pair for the same user.
    ///
    /// The old token is deleted before anything else happens, so it is gone
    /// even when a later step fails.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthorized` if the token is unknown, expired or
    /// its user no longer exists.
    #[tracing::instrument(name = "auth.rotate_refresh_token", skip_all)]
    pub async fn rotate(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let consumed = self.refresh_tokens.consume(refresh_token).await?;

        let user = self
            .users
            .find_by_id(consumed.user_id)
            .await?
            .ok_or_else(|| AuthError::unauthorized("invalid refresh token"))?;

        self.issue_pair(&user).await
    }

    /// Invalidates a refresh token. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error only if storage fails.
    pub async fn revoke(&self, refresh_token: &str) -> AuthResult<()> {
        self.refresh_tokens.revoke(refresh_token).await
    }
}
