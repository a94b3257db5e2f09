use std::sync::Arc;

use axum::extract::Extension;
use axum::response::Json;

use crate::middleware::{ApiResponse, ApiResult};
use crate::models::{AdminLoginRequest, TokenResponse};
use crate::services::AuthService;

/// POST /admin/login - Exchange admin credentials for a bearer token
pub async fn login(
    Extension(auth): Extension<Arc<AuthService>>,
    Json(payload): Json<AdminLoginRequest>,
) -> ApiResult<TokenResponse> {
    let response = auth.login(&payload.email, &payload.password).await?;
    Ok(ApiResponse::success(response))
}
