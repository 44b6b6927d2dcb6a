//! Authorization code flow manager.
//!
//! One callback endpoint serves both login and signup. The `state` parameter
//! keys a stored [`OAuthState`] holding the PKCE verifier, the intent and the
//! page to return to. The record is deleted on first read, whatever happens
//! afterwards.

use std::sync::Arc;

use alog_core::{DynOAuthStateStorage, DynUserStorage, NewUser, OAuthState, User, UserId};
use time::{Duration, OffsetDateTime};
use url::Url;

use super::pkce::{PkceChallenge, PkceVerifier};
use crate::error::{AuthError, AuthResult};
use crate::federation::{IdentityProvider, IdpError, UserInfo};
use crate::random::random_urlsafe;
use crate::token::{CredentialService, TokenPair};

/// Bytes of entropy in a generated `state`.
const STATE_BYTES: usize = 32;

/// Result of starting a flow.
#[derive(Debug, Clone)]
pub struct FlowStart {
    pub authorization_url: Url,
    pub state: String,
}

/// Result of a completed callback.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: User,
    pub tokens: TokenPair,
    /// The destination supplied when the flow was started.
    pub redirect_uri: String,
}

pub struct OAuthFlow {
    states: DynOAuthStateStorage,
    users: DynUserStorage,
    provider: Arc<dyn IdentityProvider>,
    credentials: Arc<CredentialService>,
    state_lifetime: Duration,
}

impl OAuthFlow {
    #[must_use]
    pub fn new(
        states: DynOAuthStateStorage,
        users: DynUserStorage,
        provider: Arc<dyn IdentityProvider>,
        credentials: Arc<CredentialService>,
        state_lifetime: Duration,
    ) -> Self {
        Self {
            states,
            users,
            provider,
            credentials,
            state_lifetime,
        }
    }

    /// Starts a login or signup flow.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::BadRequest` if `redirect_uri` is empty or not an
    /// absolute http(s) URL.
    #[tracing::instrument(name = "auth.initiate_flow", skip(self, redirect_uri))]
    pub async fn initiate_flow(&self, redirect_uri: &str, is_signup: bool) -> AuthResult<FlowStart> {
        validate_redirect_uri(redirect_uri)?;

        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        let state = random_urlsafe(STATE_BYTES);
        let now = OffsetDateTime::now_utc();

        let authorization_url = self.provider.authorization_url(&state, &challenge)?;

        self.states
            .create(&OAuthState {
                state: state.clone(),
                code_verifier: verifier.into_inner(),
                redirect_uri: redirect_uri.to_string(),
                is_signup,
                expires_at: now + self.state_lifetime,
                created_at: now,
            })
            .await?;

        Ok(FlowStart {
            authorization_url,
            state,
        })
    }

    /// Completes a flow.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidState` if the state is unknown, used or expired.
    ///   No provider call is made in that case.
    /// - `AuthError::Conflict` for signup when the account exists.
    /// - `AuthError::NotFound` for login when no account exists.
    /// - `AuthError::IdentityProvider` if the provider calls fail.
    #[tracing::instrument(name = "auth.handle_callback", skip_all)]
    pub async fn handle_callback(&self, code: &str, state: &str) -> AuthResult<AuthOutcome> {
        let record = self
            .states
            .take(state)
            .await?
            .ok_or(AuthError::InvalidState)?;

        if record.is_expired() {
            tracing::debug!("expired authorization state presented");
            return Err(AuthError::InvalidState);
        }

        let verifier = PkceVerifier::new(record.code_verifier)?;
        let tokens = self.provider.exchange_code(code, &verifier).await?;
        let info = self.provider.userinfo(&tokens.access_token).await?;

        let user = self.resolve_user(info, record.is_signup).await?;
        let tokens = self.credentials.issue_pair(&user).await?;

        tracing::info!(user_id = user.id, signup = record.is_signup, "user authenticated");
        Ok(AuthOutcome {
            user,
            tokens,
            redirect_uri: record.redirect_uri,
        })
    }

    /// Deletes a state without completing the flow, e.g. when the provider
    /// reports an error on the callback.
    ///
    /// # Errors
    ///
    /// Returns an error only if storage fails.
    pub async fn abandon(&self, state: &str) -> AuthResult<()> {
        self.states.take(state).await?;
        Ok(())
    }

    async fn resolve_user(&self, info: UserInfo, is_signup: bool) -> AuthResult<User> {
        let id: UserId = info.sub.parse().map_err(|_| {
            IdpError::InvalidResponse(format!("subject `{}` is not a numeric id", info.sub))
        })?;

        match (self.users.find_by_id(id).await?, is_signup) {
            (Some(_), true) => Err(AuthError::conflict("account already exists")),
            (Some(user), false) => Ok(user),
            (None, false) => Err(AuthError::not_found("account not found; sign up first")),
            (None, true) => {
                let user = self.users.create(new_user(id, info)).await?;
                tracing::info!(user_id = user.id, "user signed up");
                Ok(user)
            }
        }
    }
}

fn new_user(id: UserId, info: UserInfo) -> NewUser {
    let handle = info
        .preferred_username
        .clone()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| id.to_string());
    NewUser {
        id,
        name: info.name.unwrap_or_else(|| handle.clone()),
        handle,
        profile_image: info.picture.unwrap_or_default(),
        email: info.email,
    }
}

fn validate_redirect_uri(redirect_uri: &str) -> AuthResult<()> {
    if redirect_uri.trim().is_empty() {
        return Err(AuthError::bad_request("redirectUri is required"));
    }
    let url = Url::parse(redirect_uri)
        .map_err(|_| AuthError::bad_request("redirectUri must be an absolute URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AuthError::bad_request("redirectUri must use http or https"));
    }
    Ok(())
}
