//! `shopfront-auth`: bearer token boundary for the storefront.
//!
//! This crate is intentionally decoupled from HTTP and storage: callers hand in
//! the raw `Authorization` header value and the request path.

pub mod claims;
pub mod gate;
pub mod token;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use gate::{Access, AccessPolicy, AuthError, AuthenticatedUser, authenticate, extract_bearer};
pub use token::{Hs256JwtValidator, IssuedToken, JwtValidator, TokenIssueError};
