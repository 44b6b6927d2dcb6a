//! Authentication extractors.
//!
//! Two credential shapes are accepted:
//!
//! 1. `Authorization: Bearer <session token>`: an opaque server-side session.
//! 2. The access token cookie: a signed HS384 token.
//!
//! [`AuthUser`] rejects the request with 401 if neither is present and
//! valid. [`MaybeAuthUser`] is for public endpoints: invalid or missing
//! credentials leave the request anonymous.

use std::sync::Arc;

use alog_core::{
    DynOAuthStateStorage, DynRefreshTokenStorage, DynSessionStorage, DynUserStorage, UserId,
};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, request::Parts};
use axum_extra::extract::cookie::CookieJar;

use crate::config::{AuthConfig, ConfigError, to_time_duration};
use crate::cookies::CookiePolicy;
use crate::error::{AuthError, AuthResult};
use crate::federation::IdentityProvider;
use crate::oauth::OAuthFlow;
use crate::token::{CredentialService, RefreshTokenService, SessionService, TokenSigner};

// =============================================================================
// Auth State
// =============================================================================

/// Storage handles needed by the auth layer.
#[derive(Clone)]
pub struct AuthStorage {
    pub users: DynUserStorage,
    pub oauth_states: DynOAuthStateStorage,
    pub sessions: DynSessionStorage,
    pub refresh_tokens: DynRefreshTokenStorage,
}

/// Shared state for auth extractors and the `/auth/*` handlers.
///
/// Applications expose it through `FromRef` on their own state.
#[derive(Clone)]
pub struct AuthState {
    pub flow: Arc<OAuthFlow>,
    pub credentials: Arc<CredentialService>,
    pub sessions: Arc<SessionService>,
    pub users: DynUserStorage,
    pub cookies: Arc<CookiePolicy>,
}

impl AuthState {
    /// Wires the auth services from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, including a missing client
    /// secret or a missing or malformed signing secret.
    pub fn from_config(
        config: &AuthConfig,
        storage: AuthStorage,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let signer = TokenSigner::new(
            &config.signing_key()?,
            config.issuer.clone(),
            to_time_duration(config.access_token_lifetime),
        )
        .map_err(|e| ConfigError::InvalidValue(format!("auth.signing_secret: {e}")))?;

        let credentials = Arc::new(CredentialService::new(
            Arc::new(signer),
            RefreshTokenService::new(
                storage.refresh_tokens.clone(),
                to_time_duration(config.refresh_token_lifetime),
            ),
            storage.users.clone(),
        ));

        let flow = Arc::new(OAuthFlow::new(
            storage.oauth_states.clone(),
            storage.users.clone(),
            provider,
            credentials.clone(),
            to_time_duration(config.state_lifetime),
        ));

        Ok(Self {
            flow,
            credentials,
            sessions: Arc::new(SessionService::new(
                storage.sessions.clone(),
                to_time_duration(config.session_lifetime),
            )),
            users: storage.users,
            cookies: Arc::new(CookiePolicy::new(
                config.cookie.clone(),
                config.access_token_lifetime,
            )),
        })
    }
}

// =============================================================================
// Auth Context
// =============================================================================

/// How the caller authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    AccessToken,
    Session,
}

/// The authenticated identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: UserId,
    pub name: String,
    pub generation: u16,
    pub credential: CredentialKind,
}

/// Requires an authenticated caller.
///
/// ```ignore
/// async fn me(AuthUser(auth): AuthUser) -> String {
///     format!("hello {}", auth.name)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthContext);

/// Attaches the caller's identity when valid credentials are present.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthContext>);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        authenticate(&parts.headers, &auth_state).await.map(AuthUser)
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        match authenticate(&parts.headers, &auth_state).await {
            Ok(ctx) => Ok(MaybeAuthUser(Some(ctx))),
            Err(e) if e.is_unauthorized() => Ok(MaybeAuthUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// Extracts the bearer token from the `Authorization` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn authenticate(headers: &HeaderMap, state: &AuthState) -> AuthResult<AuthContext> {
    if let Some(token) = bearer_token(headers) {
        let session = state.sessions.find_by_token(token).await?;
        let user = state
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or_else(|| AuthError::unauthorized("invalid session"))?;
        return Ok(AuthContext {
            user_id: user.id,
            name: user.name,
            generation: user.generation,
            credential: CredentialKind::Session,
        });
    }

    access_token_context(headers, state)
}

/// Authenticates with the signed access cookie only, ignoring any bearer
/// session.
pub(crate) fn access_token_context(
    headers: &HeaderMap,
    state: &AuthState,
) -> AuthResult<AuthContext> {
    let jar = CookieJar::from_headers(headers);
    let cookie = jar
        .get(state.cookies.access_cookie_name())
        .filter(|c| !c.value().is_empty())
        .ok_or_else(|| AuthError::unauthorized("missing credentials"))?;

    let claims = state.credentials.verify(cookie.value())?;
    Ok(AuthContext {
        user_id: claims.user_id()?,
        name: claims.name,
        generation: claims.generation,
        credential: CredentialKind::AccessToken,
    })
}
