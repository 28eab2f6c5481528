//! # Bearer Token Authentication
//!
//! Callers authenticate with `Authorization: Bearer <JWT>`. Tokens are HS256
//! signed with a shared secret and carry the user's UUID in `sub`. A token
//! proves identity only; the caller's role is always read from the profile
//! store afterwards.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Minimum accepted secret length, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Authentication failures. All map to HTTP 401 / JSON-RPC -32000.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("token expired")]
    Expired,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("JWT secret must be at least {MIN_SECRET_LEN} characters")]
    WeakSecret,
}

/// Claims carried by a ledger access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The user's UUID.
    pub sub: String,
    /// Issued at (Unix seconds).
    pub iat: u64,
    /// Expiration time (Unix seconds).
    pub exp: u64,
}

/// Verifies and mints HS256 tokens with one shared secret.
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator").finish_non_exhaustive()
    }
}

impl JwtValidator {
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::WeakSecret);
        }
        Ok(Self { secret })
    }

    /// Signs a token for `user_id` valid for `ttl_secs` seconds.
    pub fn generate_token(&self, user_id: Uuid, ttl_secs: u64) -> Result<String, AuthError> {
        let now = unix_now()?;
        let exp = now
            .checked_add(ttl_secs)
            .ok_or_else(|| AuthError::Invalid(format!("ttl of {ttl_secs}s overflows expiry")))?;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Invalid(e.to_string()))
    }

    /// Verifies a token's signature and expiry and returns the subject.
    pub fn verify_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            _ => AuthError::Invalid(err.to_string()),
        })?;

        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AuthError::Invalid("sub is not a UUID".into()))
    }
}

/// Pulls the token out of an `Authorization` header value.
pub fn extract_token_from_header(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn unix_now() -> Result<u64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AuthError::Invalid(format!("system time error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-long-enough-0123456789";

    #[test]
    fn round_trip_subject() {
        let jwt = JwtValidator::new(SECRET).unwrap();
        let user = Uuid::new_v4();
        let token = jwt.generate_token(user, 60).unwrap();
        assert_eq!(jwt.verify_token(&token).unwrap(), user);
    }

    #[test]
    fn wrong_secret_rejected() {
        let a = JwtValidator::new(SECRET).unwrap();
        let b = JwtValidator::new("another-secret-that-is-long-enough-xyz").unwrap();
        let token = a.generate_token(Uuid::new_v4(), 60).unwrap();
        assert_eq!(b.verify_token(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn expired_token_rejected() {
        let jwt = JwtValidator::new(SECRET).unwrap();
        let now = unix_now().unwrap();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(jwt.verify_token(&token), Err(AuthError::Expired));
    }

    #[test]
    fn oversized_ttl_refused() {
        let jwt = JwtValidator::new(SECRET).unwrap();
        let err = jwt.generate_token(Uuid::new_v4(), u64::MAX).unwrap_err();
        assert!(matches!(err, AuthError::Invalid(_)));
    }

    #[test]
    fn short_secret_refused() {
        assert_eq!(JwtValidator::new("short").unwrap_err(), AuthError::WeakSecret);
    }

    #[test]
    fn header_parsing() {
        assert_eq!(extract_token_from_header("Bearer abc"), Some("abc"));
        assert_eq!(extract_token_from_header("Bearer "), None);
        assert_eq!(extract_token_from_header("Basic abc"), None);
    }
}
