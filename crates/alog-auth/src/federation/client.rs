//! HTTP client for the identity provider.
//!
//! Endpoints are fixed relative to the configured base URL:
//!
//! - `GET  {base}/oauth2/authorize` (browser redirect)
//! - `POST {base}/oauth2/token` (form-encoded, `authorization_code` or
//!   `refresh_token` grant)
//! - `GET  {base}/userinfo` (bearer access token)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use url::Url;

use super::error::IdpError;
use crate::config::ProviderConfig;
use crate::oauth::pkce::{PkceChallenge, PkceVerifier};

/// Operations the flow manager needs from the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds the URL the browser is sent to for authorization.
    fn authorization_url(&self, state: &str, challenge: &PkceChallenge) -> Result<Url, IdpError>;

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &PkceVerifier,
    ) -> Result<TokenResponse, IdpError>;

    /// Uses a provider refresh token to obtain new provider tokens.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, IdpError>;

    /// Fetches the subject identity for a provider access token.
    async fn userinfo(&self, access_token: &str) -> Result<UserInfo, IdpError>;
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Userinfo endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    /// Subject. Accepted as a JSON string or number.
    #[serde(deserialize_with = "string_or_number")]
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(i64),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Text(s) => s,
        Repr::Number(n) => n.to_string(),
    })
}

/// [`IdentityProvider`] over HTTP with a bounded request timeout.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    http_client: reqwest::Client,
    authorize_endpoint: Url,
    token_endpoint: Url,
    userinfo_endpoint: Url,
    client_id: String,
    client_secret: String,
    callback_url: String,
    scopes: String,
}

fn endpoint(base: &str, path: &str) -> Result<Url, IdpError> {
    Ok(Url::parse(&format!("{}/{path}", base.trim_end_matches('/')))?)
}

impl HttpIdentityProvider {
    /// Creates the client.
    ///
    /// # Errors
    ///
    /// Fails if the client secret is missing, a URL does not parse, or the
    /// HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, IdpError> {
        let client_secret = config
            .client_secret
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| IdpError::Configuration("client secret is not set".into()))?;

        Ok(Self {
            http_client: build_client(config.request_timeout)?,
            authorize_endpoint: endpoint(&config.base_url, "oauth2/authorize")?,
            token_endpoint: endpoint(&config.base_url, "oauth2/token")?,
            userinfo_endpoint: endpoint(&config.base_url, "userinfo")?,
            client_id: config.client_id.clone(),
            client_secret,
            callback_url: Url::parse(&config.callback_url)?.to_string(),
            scopes: config.scopes.join(" "),
        })
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, IdpError> {
        let response = self
            .http_client
            .post(self.token_endpoint.clone())
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdpError::TokenRequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| IdpError::InvalidResponse(format!("token response: {e}")))
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, IdpError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn authorization_url(&self, state: &str, challenge: &PkceChallenge) -> Result<Url, IdpError> {
        let mut url = self.authorize_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.callback_url)
            .append_pair("scope", &self.scopes)
            .append_pair("state", state)
            .append_pair("code_challenge", challenge.as_str())
            .append_pair("code_challenge_method", challenge.method().as_str());
        Ok(url)
    }

    #[tracing::instrument(name = "idp.exchange_code", skip_all)]
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &PkceVerifier,
    ) -> Result<TokenResponse, IdpError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.callback_url),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("code_verifier", verifier.as_str()),
        ])
        .await
    }

    #[tracing::instrument(name = "idp.refresh", skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, IdpError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("redirect_uri", &self.callback_url),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    #[tracing::instrument(name = "idp.userinfo", skip_all)]
    async fn userinfo(&self, access_token: &str) -> Result<UserInfo, IdpError> {
        let response = self
            .http_client
            .get(self.userinfo_endpoint.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdpError::UserinfoFailed {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<UserInfo>()
            .await
            .map_err(|e| IdpError::InvalidResponse(format!("userinfo response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> HttpIdentityProvider {
        HttpIdentityProvider::new(&ProviderConfig {
            base_url: base_url.to_string(),
            client_id: "alog".into(),
            client_secret: Some("s3cret".into()),
            callback_url: "https://log.example.com/auth/callback".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_missing_secret_rejected() {
        let err = HttpIdentityProvider::new(&ProviderConfig {
            client_id: "alog".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, IdpError::Configuration(_)));
    }

    #[test]
    fn test_authorization_url() {
        let provider = provider("https://accounts.example/");
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        let url = provider.authorization_url("st4te", &challenge).unwrap();

        assert_eq!(url.path(), "/oauth2/authorize");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "alog");
        assert_eq!(pairs["redirect_uri"], "https://log.example.com/auth/callback");
        assert_eq!(pairs["scope"], "openid profile email");
        assert_eq!(pairs["state"], "st4te");
        assert_eq!(pairs["code_challenge"], challenge.as_str());
        assert_eq!(pairs["code_challenge_method"], "S256");
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("client_secret=s3cret"))
            .and(body_string_contains("code_verifier="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "idp-access",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = provider(&server.uri())
            .exchange_code("abc", &PkceVerifier::generate())
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "idp-access");
        assert_eq!(tokens.expires_in, Some(3600));
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_token_error_surfaces_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .exchange_code("bad", &PkceVerifier::generate())
            .await
            .unwrap_err();
        match err {
            IdpError::TokenRequestFailed { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a2",
                "token_type": "Bearer",
                "refresh_token": "r2"
            })))
            .mount(&server)
            .await;

        let tokens = provider(&server.uri()).refresh("r1").await.unwrap();
        assert_eq!(tokens.refresh_token.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_userinfo_uses_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer idp-access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": 42,
                "email": "kim@example.com",
                "email_verified": true,
                "name": "Kim",
                "preferred_username": "kim"
            })))
            .mount(&server)
            .await;

        let info = provider(&server.uri()).userinfo("idp-access").await.unwrap();
        assert_eq!(info.sub, "42");
        assert_eq!(info.name.as_deref(), Some("Kim"));
        assert!(info.picture.is_none());
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let provider = HttpIdentityProvider::new(&ProviderConfig {
            base_url: server.uri(),
            client_id: "alog".into(),
            client_secret: Some("s3cret".into()),
            request_timeout: Duration::from_millis(50),
            ..Default::default()
        })
        .unwrap();

        let err = provider.userinfo("t").await.unwrap_err();
        assert!(err.is_timeout());
    }
}
