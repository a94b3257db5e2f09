use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Claims carried by an admin bearer token. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub admin_email: String,
    pub org_id: Uuid,
    pub organization_name: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(
        admin_email: String,
        org_id: Uuid,
        organization_name: String,
        now: DateTime<Utc>,
        ttl_hours: u64,
    ) -> Self {
        let exp = (now + Duration::hours(ttl_hours as i64)).timestamp();
        Self {
            admin_email,
            org_id,
            organization_name,
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token generation failed: {0}")]
    Issue(String),

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token has expired")]
    Expired,

    #[error("JWT secret is not configured")]
    MissingSecret,
}

/// Sign the claims into an HS256 bearer token.
pub fn issue_token(claims: &Claims, secret: &str) -> Result<String, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| TokenError::Issue(e.to_string()))
}

/// Decode and verify a bearer token against the configured secret.
///
/// Expiry is checked against the caller-supplied `now` rather than the
/// system clock. Tokens signed with another key or algorithm fail signature
/// validation (the default validation accepts HS256 only), and tokens
/// missing any required claim fail to deserialize.
pub fn verify_token(token: &str, secret: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = false;
    validation.set_required_spec_claims(&["exp"]);

    let data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| TokenError::Invalid(e.to_string()))?;

    if data.claims.exp < now.timestamp() {
        return Err(TokenError::Expired);
    }

    Ok(data.claims)
}
