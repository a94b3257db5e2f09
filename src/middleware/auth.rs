use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{self, Claims};
use crate::config;
use crate::error::ApiError;

/// Authenticated admin context extracted from a verified bearer token.
#[derive(Clone, Debug)]
pub struct AuthAdmin {
    pub admin_email: String,
    pub org_id: Uuid,
    pub organization_name: String,
}

impl From<Claims> for AuthAdmin {
    fn from(claims: Claims) -> Self {
        Self {
            admin_email: claims.admin_email,
            org_id: claims.org_id,
            organization_name: claims.organization_name,
        }
    }
}

/// Bearer-token middleware for the protected organization routes.
///
/// Absent, malformed, expired, badly signed, or claim-incomplete tokens all
/// map to 401. On success an [`AuthAdmin`] extension is injected for the
/// handlers downstream.
pub async fn bearer_auth_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_from_headers(&headers).map_err(ApiError::unauthorized)?;

    let secret = &config::config().security.jwt_secret;
    let claims = auth::verify_token(&token, secret, Utc::now())
        .map_err(|e| ApiError::unauthorized(format!("Could not validate credentials: {}", e)))?;

    request.extensions_mut().insert(AuthAdmin::from(claims));

    Ok(next.run(request).await)
}

/// Extract the token from an `Authorization: Bearer <token>` header.
fn extract_bearer_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get("authorization")
        .or_else(|| headers.get("Authorization"))
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty bearer token".to_string());
        }
        Ok(token.to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}
