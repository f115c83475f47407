use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shopfront_core::UserId;

/// JWT claims model (transport-agnostic).
///
/// Timestamps travel as the registered `iat`/`exp` claims (seconds since epoch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the stable user identifier the token was issued for.
    pub sub: UserId,

    /// Issued-at timestamp.
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl JwtClaims {
    /// `None` when `now + ttl` falls outside the representable date range.
    pub fn new(sub: UserId, now: DateTime<Utc>, ttl: Duration) -> Option<Self> {
        Some(Self {
            sub,
            issued_at: now,
            expires_at: now.checked_add_signed(ttl)?,
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("malformed token: {0}")]
    Malformed(String),
}

/// Deterministically validate JWT claims.
///
/// Note: this validates the *claims* only. Signature verification happens in
/// [`crate::token`].
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn claims_inside_window_are_valid() {
        let claims = JwtClaims::new(UserId::new(), t0(), Duration::minutes(10)).unwrap();
        assert_eq!(validate_claims(&claims, t0()), Ok(()));
        assert_eq!(validate_claims(&claims, t0() + Duration::minutes(9)), Ok(()));
    }

    #[test]
    fn claims_at_or_after_expiry_are_rejected() {
        let claims = JwtClaims::new(UserId::new(), t0(), Duration::minutes(10)).unwrap();
        assert_eq!(
            validate_claims(&claims, t0() + Duration::minutes(10)),
            Err(TokenValidationError::Expired)
        );
    }

    #[test]
    fn claims_from_the_future_are_rejected() {
        let claims = JwtClaims::new(UserId::new(), t0(), Duration::minutes(10)).unwrap();
        assert_eq!(
            validate_claims(&claims, t0() - Duration::seconds(1)),
            Err(TokenValidationError::NotYetValid)
        );
    }

    #[test]
    fn empty_window_is_rejected() {
        let claims = JwtClaims::new(UserId::new(), t0(), Duration::zero()).unwrap();
        assert_eq!(
            validate_claims(&claims, t0()),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn out_of_range_expiry_is_refused() {
        assert_eq!(JwtClaims::new(UserId::new(), t0(), Duration::MAX), None);
        assert_eq!(JwtClaims::new(UserId::new(), DateTime::<Utc>::MAX_UTC, Duration::seconds(1)), None);
    }

    #[test]
    fn claims_serialize_as_registered_names() {
        let claims = JwtClaims::new(UserId::new(), t0(), Duration::seconds(60)).unwrap();
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["iat"], 1_700_000_000i64);
        assert_eq!(json["exp"], 1_700_000_060i64);
        assert_eq!(json["sub"], claims.sub.to_string());
    }
}
