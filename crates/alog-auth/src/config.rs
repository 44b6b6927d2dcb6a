//! Authentication configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "log.ana.st"
//! signing_secret = "base64-encoded-secret"
//! access_token_lifetime = "4h"
//! refresh_token_lifetime = "20days"
//!
//! [auth.provider]
//! base_url = "https://accounts.ana.st"
//! client_id = "alog"
//! client_secret = "..."
//! callback_url = "https://log.example.com/auth/callback"
//! ```

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// Minimum decoded length of the token signing secret.
pub const MIN_SIGNING_SECRET_BYTES: usize = 32;

/// Root authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Value of the `iss` claim in signed access tokens.
    pub issuer: String,

    /// Base64-encoded HMAC key for access tokens.
    #[serde(skip_serializing)]
    pub signing_secret: Option<String>,

    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Lifetime of a pending authorization flow.
    #[serde(with = "humantime_serde")]
    pub state_lifetime: Duration,

    #[serde(with = "humantime_serde")]
    pub session_lifetime: Duration,

    /// How often expired states, sessions and refresh tokens are purged.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    pub cookie: CookieConfig,

    pub provider: ProviderConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "log.ana.st".to_string(),
            signing_secret: None,
            access_token_lifetime: Duration::from_secs(4 * 60 * 60),
            refresh_token_lifetime: Duration::from_secs(20 * 24 * 60 * 60),
            state_lifetime: Duration::from_secs(10 * 60),
            session_lifetime: Duration::from_secs(20 * 24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
            cookie: CookieConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

/// Cookie attributes for the access and refresh token cookies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    pub access_token_name: String,
    pub refresh_token_name: String,
    pub secure: bool,
    pub domain: Option<String>,
    pub path: String,
    /// Subtracted from the access token lifetime to get the cookie max-age,
    /// so the browser drops the cookie before the token expires.
    #[serde(with = "humantime_serde")]
    pub expiry_margin: Duration,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            access_token_name: "alog_tkn".to_string(),
            refresh_token_name: "refresh_tkn".to_string(),
            secure: true,
            domain: None,
            path: "/".to_string(),
            expiry_margin: Duration::from_secs(60),
        }
    }
}

/// External identity provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL; `/oauth2/authorize`, `/oauth2/token` and `/userinfo` are
    /// resolved against it.
    pub base_url: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    /// Where the provider sends the browser back to. Must route to
    /// `GET /auth/callback`.
    pub callback_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://accounts.ana.st".to_string(),
            client_id: String::new(),
            client_secret: None,
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
            callback_url: "http://localhost:8080/auth/callback".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the client secret, client id or
    /// signing secret is absent, and `ConfigError::InvalidValue` for a
    /// malformed signing secret, an empty issuer, zero lifetimes or an
    /// unparseable provider URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::InvalidValue("auth.issuer is empty".into()));
        }

        self.signing_key()?;

        for (name, value) in [
            ("auth.access_token_lifetime", self.access_token_lifetime),
            ("auth.refresh_token_lifetime", self.refresh_token_lifetime),
            ("auth.state_lifetime", self.state_lifetime),
            ("auth.session_lifetime", self.session_lifetime),
            ("auth.cleanup_interval", self.cleanup_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{name} must be positive")));
            }
        }

        if self.cookie.expiry_margin >= self.access_token_lifetime {
            return Err(ConfigError::InvalidValue(
                "auth.cookie.expiry_margin must be shorter than the access token lifetime".into(),
            ));
        }

        self.provider.validate()
    }

    /// Decodes the signing secret.
    ///
    /// # Errors
    ///
    /// Fails if the secret is absent, not valid base64, or shorter than
    /// [`MIN_SIGNING_SECRET_BYTES`] once decoded.
    pub fn signing_key(&self) -> Result<Vec<u8>, ConfigError> {
        let encoded = self
            .signing_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("auth.signing_secret".into()))?;

        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ConfigError::InvalidValue(format!("auth.signing_secret: {e}")))?;

        if key.len() < MIN_SIGNING_SECRET_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "auth.signing_secret must decode to at least {MIN_SIGNING_SECRET_BYTES} bytes"
            )));
        }
        Ok(key)
    }
}

impl ProviderConfig {
    /// Validates the provider settings.
    ///
    /// # Errors
    ///
    /// A missing client secret is reported as `ConfigError::Missing`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("auth.provider.client_id".into()));
        }
        if self
            .client_secret
            .as_deref()
            .is_none_or(|s| s.trim().is_empty())
        {
            return Err(ConfigError::Missing("auth.provider.client_secret".into()));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::InvalidValue(format!("auth.provider.base_url: {e}")))?;
        url::Url::parse(&self.callback_url)
            .map_err(|e| ConfigError::InvalidValue(format!("auth.provider.callback_url: {e}")))?;
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.provider.request_timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Converts a configured duration into a `time::Duration`, saturating.
#[must_use]
pub fn to_time_duration(duration: Duration) -> time::Duration {
    time::Duration::try_from(duration).unwrap_or(time::Duration::MAX)
}
