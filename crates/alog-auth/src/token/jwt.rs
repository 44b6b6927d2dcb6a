//! Signed access tokens.
//!
//! Tokens are HS384 JWTs carrying the user's id, display name and
//! generation. Verification pins the algorithm: a token whose header names
//! any other algorithm, including `none`, is rejected before the signature
//! is looked at.
//!
//! ```ignore
//! let signer = TokenSigner::from_base64(secret, "log.ana.st", Duration::hours(4))?;
//! let signed = signer.sign(&user)?;
//! let claims = signer.verify(&signed.token)?;
//! assert_eq!(claims.user_id()?, user.id);
//! ```

use alog_core::{User, UserId};
use base64::{Engine, engine::general_purpose::STANDARD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::config::MIN_SIGNING_SECRET_BYTES;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to encode token: {message}")]
    EncodingError { message: String },

    #[error("Failed to decode token: {message}")]
    DecodingError { message: String },

    #[error("Token expired")]
    Expired,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid claims: {message}")]
    InvalidClaims { message: String },

    #[error("Invalid key: {message}")]
    InvalidKey { message: String },
}

impl JwtError {
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User id, as a decimal string.
    pub sub: String,
    pub name: String,
    pub generation: u16,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessTokenClaims {
    /// Parses the subject back into a user id.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::InvalidClaims` if `sub` is not an integer.
    pub fn user_id(&self) -> Result<UserId, JwtError> {
        self.sub
            .parse()
            .map_err(|_| JwtError::invalid_claims("subject is not a user id"))
    }
}

/// A freshly signed token and its expiry.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

// ============================================================================
// Signer
// ============================================================================

/// Signs and verifies access tokens with a server-held HMAC key.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    lifetime: Duration,
}

impl TokenSigner {
    /// The only accepted algorithm.
    pub const ALGORITHM: Algorithm = Algorithm::HS384;

    /// Creates a signer from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::InvalidKey` if the key is shorter than
    /// [`MIN_SIGNING_SECRET_BYTES`].
    pub fn new(key: &[u8], issuer: impl Into<String>, lifetime: Duration) -> Result<Self, JwtError> {
        if key.len() < MIN_SIGNING_SECRET_BYTES {
            return Err(JwtError::invalid_key(format!(
                "signing key must be at least {MIN_SIGNING_SECRET_BYTES} bytes"
            )));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            issuer: issuer.into(),
            lifetime,
        })
    }

    /// Creates a signer from a base64-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::InvalidKey` if the secret does not decode or is
    /// too short.
    pub fn from_base64(
        secret: &str,
        issuer: impl Into<String>,
        lifetime: Duration,
    ) -> Result<Self, JwtError> {
        let key = STANDARD
            .decode(secret.trim())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        Self::new(&key, issuer, lifetime)
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Signs an access token for `user`, issued now.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::EncodingError` if serialization or signing fails.
    pub fn sign(&self, user: &User) -> Result<SignedToken, JwtError> {
        self.sign_at(user, OffsetDateTime::now_utc())
    }

    /// Signs an access token for `user` as if issued at `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::EncodingError` if serialization or signing fails.
    pub fn sign_at(&self, user: &User, issued_at: OffsetDateTime) -> Result<SignedToken, JwtError> {
        let expires_at = issued_at + self.lifetime;
        let claims = AccessTokenClaims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            generation: user.generation,
            iss: self.issuer.clone(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };

        let token = encode(&Header::new(Self::ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))?;
        Ok(SignedToken { token, expires_at })
    }

    /// Verifies signature, algorithm, issuer and expiry.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Expired` for an expired token,
    /// `JwtError::InvalidSignature` for a signature mismatch and
    /// `JwtError::DecodingError` for malformed tokens or a foreign algorithm.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        let mut validation = Validation::new(Self::ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    const KEY: [u8; 48] = [42u8; 48];

    fn signer() -> TokenSigner {
        TokenSigner::new(&KEY, "log.ana.st", Duration::hours(4)).unwrap()
    }

    fn user() -> User {
        alog_core::NewUser {
            id: 1234,
            name: "Kim".into(),
            handle: "kim".into(),
            profile_image: String::new(),
            email: None,
        }
        .into_user(OffsetDateTime::now_utc())
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let mut user = user();
        user.generation = 7;
        let signed = signer().sign(&user).unwrap();
        let claims = signer().verify(&signed.token).unwrap();

        assert_eq!(claims.user_id().unwrap(), 1234);
        assert_eq!(claims.name, "Kim");
        assert_eq!(claims.generation, 7);
        assert_eq!(claims.iss, "log.ana.st");
        assert_eq!(claims.exp - claims.iat, 4 * 60 * 60);
        assert_eq!(signed.expires_at.unix_timestamp(), claims.exp);
    }

    #[test]
    fn test_header_names_hs384() {
        let signed = signer().sign(&user()).unwrap();
        let header = jsonwebtoken::decode_header(&signed.token).unwrap();
        assert_eq!(header.alg, Algorithm::HS384);
    }

    #[test]
    fn test_expired_token_rejected() {
        let issued = OffsetDateTime::now_utc() - Duration::hours(5);
        let signed = signer().sign_at(&user(), issued).unwrap();
        assert!(matches!(signer().verify(&signed.token), Err(JwtError::Expired)));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signed = signer().sign(&user()).unwrap();
        let other = TokenSigner::new(&[9u8; 48], "log.ana.st", Duration::hours(4)).unwrap();
        assert!(matches!(
            other.verify(&signed.token),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn test_other_hmac_algorithm_rejected() {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AccessTokenClaims {
            sub: "1".into(),
            name: "x".into(),
            generation: 0,
            iss: "log.ana.st".into(),
            iat: now,
            exp: now + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&KEY),
        )
        .unwrap();
        assert!(signer().verify(&token).is_err());
    }

    #[test]
    fn test_none_algorithm_rejected() {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(
            r#"{{"sub":"1","name":"x","generation":0,"iss":"log.ana.st","iat":{now},"exp":{}}}"#,
            now + 3600
        ));
        let token = format!("{header}.{payload}.");
        assert!(signer().verify(&token).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let signed = TokenSigner::new(&KEY, "someone-else", Duration::hours(4))
            .unwrap()
            .sign(&user())
            .unwrap();
        assert!(matches!(
            signer().verify(&signed.token),
            Err(JwtError::InvalidClaims { .. })
        ));
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(matches!(
            signer().verify("not.a.jwt"),
            Err(JwtError::DecodingError { .. })
        ));
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(TokenSigner::new(&[1u8; 16], "x", Duration::hours(1)).is_err());
        assert!(TokenSigner::from_base64("%%%", "x", Duration::hours(1)).is_err());
        let encoded = STANDARD.encode(KEY);
        assert!(TokenSigner::from_base64(&encoded, "x", Duration::hours(1)).is_ok());
    }
}
