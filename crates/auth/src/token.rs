//! HS256 token issuance and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use shopfront_core::UserId;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

/// Verifies a bearer token and yields its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenIssueError {
    #[error("token ttl must be positive")]
    NonPositiveTtl,

    #[error("token ttl pushes expiry out of range")]
    TtlOutOfRange,

    #[error("failed to encode token: {0}")]
    Encode(String),
}

/// A signed token together with the expiry baked into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Shared-secret (HS256) token issuer and validator.
///
/// Expiry is checked by [`validate_claims`] against the caller's clock rather
/// than by `jsonwebtoken`, so verification stays deterministic under test.
pub struct Hs256JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(&secret),
            decoding: DecodingKey::from_secret(&secret),
            validation,
        }
    }

    /// Mint a token for `user_id`, valid from `now` for `ttl`.
    pub fn issue(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenIssueError> {
        if ttl <= Duration::zero() {
            return Err(TokenIssueError::NonPositiveTtl);
        }
        let claims = JwtClaims::new(user_id, now, ttl).ok_or(TokenIssueError::TtlOutOfRange)?;
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenIssueError::Encode(e.to_string()))?;
        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at,
        })
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenValidationError::BadSignature,
                ErrorKind::ExpiredSignature => TokenValidationError::Expired,
                _ => TokenValidationError::Malformed(e.to_string()),
            })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}
