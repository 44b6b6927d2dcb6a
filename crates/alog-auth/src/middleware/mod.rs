//! Request authentication for axum handlers.

pub mod auth;
pub mod error;

pub use auth::{AuthContext, AuthState, AuthStorage, AuthUser, CredentialKind, MaybeAuthUser};
pub use error::ErrorBody;
