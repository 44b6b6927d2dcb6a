//! External identity provider integration.

pub mod client;
pub mod error;

pub use client::{HttpIdentityProvider, IdentityProvider, TokenResponse, UserInfo};
pub use error::IdpError;
