//! Route gating: which paths need a bearer token, and who presented it.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use thiserror::Error;

use shopfront_core::UserId;

use crate::claims::TokenValidationError;
use crate::token::JwtValidator;

/// Identity established from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Rejection at the authentication boundary.
///
/// `MissingToken` means no credentials were offered at all; the other variants
/// mean credentials were offered and failed verification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no bearer token supplied")]
    MissingToken,

    #[error("malformed authorization header")]
    MalformedHeader,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenValidationError),
}

impl AuthError {
    pub fn is_missing_token(&self) -> bool {
        matches!(self, AuthError::MissingToken)
    }
}

/// Outcome of gating a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated(AuthenticatedUser),
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MalformedHeader)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }

    Ok(token)
}

/// Verify the bearer token in `header` and resolve the user it names.
pub fn authenticate(
    validator: &dyn JwtValidator,
    header: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AuthenticatedUser, AuthError> {
    let token = extract_bearer(header)?;
    let claims = validator.validate(token, now)?;

    Ok(AuthenticatedUser {
        user_id: claims.sub,
        expires_at: claims.expires_at,
    })
}

/// Public/protected split of the storefront's routes.
///
/// Paths not covered by a public prefix require a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    public_prefixes: Vec<Cow<'static, str>>,
}

impl AccessPolicy {
    pub fn new<I, P>(public_prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Cow<'static, str>>,
    {
        Self {
            public_prefixes: public_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Landing page, sign-in/up, and catalog pages are open; cart and checkout are not.
    pub fn storefront() -> Self {
        Self::new(["/", "/login", "/register", "/products", "/health"])
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes.iter().any(|prefix| {
            let prefix = prefix.as_ref();
            if prefix == "/" {
                return path == "/";
            }
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn authorize_request(
        &self,
        validator: &dyn JwtValidator,
        path: &str,
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Access, AuthError> {
        if self.is_public(path) {
            return Ok(Access::Public);
        }

        match authenticate(validator, header, now) {
            Ok(user) => Ok(Access::Authenticated(user)),
            Err(e) => {
                tracing::debug!(path, error = %e, "request rejected at auth gate");
                Err(e)
            }
        }
    }
}
