//! `/auth/*` HTTP handlers.
//!
//! | Method | Path                 | Purpose                                  |
//! |--------|----------------------|------------------------------------------|
//! | POST   | `/auth/login/init`   | start a login flow                       |
//! | POST   | `/auth/signup/init`  | start a signup flow                      |
//! | GET    | `/auth/callback`     | finish a flow, set cookies, 303 redirect |
//! | PUT    | `/auth/token`        | rotate the refresh token                 |
//! | DELETE | `/auth/token`        | log out                                  |
//! | POST   | `/auth/session`      | open a bearer session from `alog_tkn`    |
//! | DELETE | `/auth/session`      | close the presented bearer session       |

use axum::{
    Json, Router,
    extract::{FromRef, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post, put},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{AuthError, AuthResult};
use crate::middleware::auth::{access_token_context, bearer_token};
use crate::middleware::AuthState;

/// Builds the auth router for any application state that can produce an
/// [`AuthState`].
pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    AuthState: FromRef<S>,
{
    Router::new()
        .route("/auth/login/init", post(login_init))
        .route("/auth/signup/init", post(signup_init))
        .route("/auth/callback", get(callback))
        .route("/auth/token", put(refresh).delete(logout))
        .route("/auth/session", post(create_session).delete(delete_session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    pub authorization_url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

async fn initiate(
    auth: &AuthState,
    body: Result<Json<InitRequest>, JsonRejection>,
    is_signup: bool,
) -> AuthResult<Json<InitResponse>> {
    let Json(request) = body.map_err(|e| AuthError::bad_request(e.body_text()))?;
    let redirect_uri = request
        .redirect_uri
        .ok_or_else(|| AuthError::bad_request("redirectUri is required"))?;

    let start = auth.flow.initiate_flow(&redirect_uri, is_signup).await?;
    Ok(Json(InitResponse {
        authorization_url: start.authorization_url.to_string(),
        state: start.state,
    }))
}

#[tracing::instrument(name = "auth.login_init", skip_all)]
async fn login_init(
    State(auth): State<AuthState>,
    body: Result<Json<InitRequest>, JsonRejection>,
) -> AuthResult<Json<InitResponse>> {
    initiate(&auth, body, false).await
}

#[tracing::instrument(name = "auth.signup_init", skip_all)]
async fn signup_init(
    State(auth): State<AuthState>,
    body: Result<Json<InitRequest>, JsonRejection>,
) -> AuthResult<Json<InitResponse>> {
    initiate(&auth, body, true).await
}

#[tracing::instrument(name = "auth.callback", skip_all)]
async fn callback(
    State(auth): State<AuthState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> AuthResult<impl IntoResponse> {
    if let Some(error) = params.error {
        if let Some(state) = params.state.as_deref() {
            auth.flow.abandon(state).await?;
        }
        tracing::info!(
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "provider returned an authorization error"
        );
        return Err(AuthError::bad_request(format!("authorization failed: {error}")));
    }

    let (Some(code), Some(state)) = (params.code, params.state) else {
        return Err(AuthError::bad_request("code and state are required"));
    };

    let outcome = auth.flow.handle_callback(&code, &state).await?;
    let [access, refresh] = auth.cookies.issue(&outcome.tokens);
    let jar = jar.add(access).add(refresh);

    Ok((jar, Redirect::to(&outcome.redirect_uri)))
}

#[tracing::instrument(name = "auth.refresh", skip_all)]
async fn refresh(
    State(auth): State<AuthState>,
    jar: CookieJar,
) -> AuthResult<impl IntoResponse> {
    let token = jar
        .get(auth.cookies.refresh_cookie_name())
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::unauthorized("missing refresh token"))?;

    let pair = auth.credentials.rotate(&token).await?;
    let [access, refresh] = auth.cookies.issue(&pair);
    Ok((jar.add(access).add(refresh), StatusCode::NO_CONTENT))
}

#[tracing::instrument(name = "auth.logout", skip_all)]
async fn logout(State(auth): State<AuthState>, jar: CookieJar) -> AuthResult<impl IntoResponse> {
    if let Some(token) = jar
        .get(auth.cookies.refresh_cookie_name())
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
    {
        auth.credentials.revoke(&token).await?;
    }

    let [access, refresh] = auth.cookies.clear();
    Ok((jar.add(access).add(refresh), StatusCode::NO_CONTENT))
}

#[tracing::instrument(name = "auth.create_session", skip_all)]
async fn create_session(
    State(auth): State<AuthState>,
    headers: HeaderMap,
) -> AuthResult<(StatusCode, Json<SessionResponse>)> {
    // Sessions are opened from a signed access token, never from another session.
    let ctx = access_token_context(&headers, &auth)?;
    let session = auth.sessions.create_session(ctx.user_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session_token: session.session_token,
            expires_at: session.expires_at,
        }),
    ))
}

#[tracing::instrument(name = "auth.delete_session", skip_all)]
async fn delete_session(
    State(auth): State<AuthState>,
    headers: HeaderMap,
) -> AuthResult<StatusCode> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AuthError::unauthorized("missing session token"))?;
    auth.sessions.delete(token).await?;
    Ok(StatusCode::NO_CONTENT)
}
