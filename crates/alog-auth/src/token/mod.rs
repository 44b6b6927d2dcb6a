//! Credentials issued after login.
//!
//! - [`jwt`]: stateless HS384 access tokens.
//! - [`refresh`]: single-use refresh tokens.
//! - [`service`]: access/refresh pairs and rotation.
//! - [`session`]: opaque server-side sessions.

pub mod jwt;
pub mod refresh;
pub mod service;
pub mod session;

pub use jwt::{AccessTokenClaims, JwtError, SignedToken, TokenSigner};
pub use refresh::{RefreshTokenService, generate_refresh_token};
pub use service::{CredentialService, TokenPair};
pub use session::SessionService;
