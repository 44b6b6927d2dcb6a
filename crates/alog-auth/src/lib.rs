//! Authentication for the alog backend.
//!
//! - [`oauth`]: PKCE primitives and the authorization code flow manager.
//! - [`federation`]: HTTP client for the external identity provider.
//! - [`token`]: HS384 access tokens, rotating refresh tokens and opaque
//!   sessions.
//! - [`middleware`]: axum extractors that turn cookies or bearer headers into
//!   a typed [`AuthContext`](middleware::AuthContext).
//! - [`handlers`]: the `/auth/*` routes.

pub mod config;
pub mod cookies;
pub mod error;
pub mod federation;
pub mod handlers;
pub mod maintenance;
pub mod middleware;
pub mod oauth;
mod random;
pub mod token;

pub use config::{AuthConfig, ConfigError, CookieConfig, ProviderConfig};
pub use error::{AuthError, AuthResult};
pub use middleware::{AuthContext, AuthState, AuthUser, CredentialKind, MaybeAuthUser};
