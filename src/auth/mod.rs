//! Bearer-token verification against a shared HS256 secret.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// Decoded token payload. Claims are free-form; `username` is surfaced for
/// request logging only and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Verify a `Authorization: Bearer <token>` header value.
///
/// Tokens without an `exp` claim are accepted; tokens carrying one must not
/// be expired.
pub fn verify_bearer(header: Option<&str>, secret: &str) -> Result<Claims, ProxyError> {
    let header = header.ok_or_else(|| {
        ProxyError::Unauthorized("Access denied. No token provided.".to_string())
    })?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        ProxyError::Unauthorized("Access denied. No token provided.".to_string())
    })?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| ProxyError::Unauthorized(format!("Invalid or expired token: {}", e)))?;

    Ok(data.claims)
}
