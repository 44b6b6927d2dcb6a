//! OAuth 2.0 authorization code flow with PKCE.

pub mod flow;
pub mod pkce;

pub use flow::{AuthOutcome, FlowStart, OAuthFlow};
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
