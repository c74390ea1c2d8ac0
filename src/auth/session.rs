//! Session Tokens
//!
//! After a wallet proves key ownership the server issues a short-lived
//! HS256 JWT. Subsequent API calls present the token instead of re-signing.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use crate::core::hash::PaymentKeyHash;

/// Default session lifetime (seconds).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Session token configuration.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// HS256 signing secret. Sessions are disabled when absent.
    pub secret: Option<String>,
    /// Issuer claim written into and required on tokens.
    pub issuer: String,
    /// Token lifetime in seconds.
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            issuer: "cognosis".to_string(),
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl SessionConfig {
    /// Check if session signing is configured.
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the authenticated wallet address (hex).
    pub sub: String,
    /// Payment credential proven during login.
    pub pkh: PaymentKeyHash,
    /// Expiry timestamp (Unix seconds).
    pub exp: u64,
    /// Issued at timestamp.
    pub iat: u64,
    /// Issuer.
    pub iss: String,
}

/// Issue a session token for a verified wallet.
pub fn issue_token(
    address: &str,
    pkh: PaymentKeyHash,
    config: &SessionConfig,
) -> Result<String, AuthError> {
    issue_token_at(address, pkh, config, Utc::now())
}

/// Issue a session token with `issued_at` as the `iat` claim.
pub fn issue_token_at(
    address: &str,
    pkh: PaymentKeyHash,
    config: &SessionConfig,
    issued_at: DateTime<Utc>,
) -> Result<String, AuthError> {
    let secret = config.secret.as_ref().ok_or(AuthError::NotConfigured)?;
    let now = u64::try_from(issued_at.timestamp()).unwrap_or_default();
    let claims = SessionClaims {
        sub: address.to_string(),
        pkh,
        exp: now + config.ttl_secs,
        iat: now,
        iss: config.issuer.clone(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Token(e.to_string()))
}

/// Validate a session token and extract claims.
pub fn validate_token(token: &str, config: &SessionConfig) -> Result<SessionClaims, AuthError> {
    let secret = config.secret.as_ref().ok_or(AuthError::NotConfigured)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.validate_aud = false;

    let token_data: TokenData<SessionClaims> =
        decode(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map_err(map_jwt_error)?;

    let claims = token_data.claims;
    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }
    Ok(claims)
}

/// Map JWT library errors to our error type.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::Token(err.to_string()),
    }
}
