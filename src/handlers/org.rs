use std::sync::Arc;

use axum::extract::{Extension, Query};
use axum::response::Json;
use serde::Deserialize;

use crate::middleware::{ApiResponse, ApiResult, AuthAdmin};
use crate::models::{
    CreateOrganizationRequest, DeleteConfirmation, MigrationSummary, OrganizationView,
    UpdateOrganizationRequest,
};
use crate::services::OrganizationService;

#[derive(Debug, Deserialize)]
pub struct OrgNameQuery {
    pub organization_name: String,
}

/// POST /org/create - Register a new organization and provision its partition
pub async fn create(
    Extension(orgs): Extension<Arc<OrganizationService>>,
    Json(payload): Json<CreateOrganizationRequest>,
) -> ApiResult<OrganizationView> {
    let view = orgs
        .create(&payload.organization_name, &payload.email, &payload.password)
        .await?;
    Ok(ApiResponse::created(view))
}

/// GET /org/get?organization_name= - Fetch an organization by name
pub async fn get(
    Extension(orgs): Extension<Arc<OrganizationService>>,
    Query(query): Query<OrgNameQuery>,
) -> ApiResult<OrganizationView> {
    let view = orgs.get(&query.organization_name).await?;
    Ok(ApiResponse::success(view))
}

/// PUT /org/update - Rename an organization, migrating its partition
///
/// The tenant is identified by the payload's (current) admin email; the
/// verified token's email must match it.
pub async fn update(
    Extension(orgs): Extension<Arc<OrganizationService>>,
    Extension(admin): Extension<AuthAdmin>,
    Json(payload): Json<UpdateOrganizationRequest>,
) -> ApiResult<MigrationSummary> {
    let summary = orgs
        .rename(
            &payload.organization_name,
            &payload.email,
            &payload.password,
            &admin.admin_email,
        )
        .await?;
    Ok(ApiResponse::success(summary))
}

/// DELETE /org/delete?organization_name= - Destroy an organization and its partition
pub async fn delete(
    Extension(orgs): Extension<Arc<OrganizationService>>,
    Extension(admin): Extension<AuthAdmin>,
    Query(query): Query<OrgNameQuery>,
) -> ApiResult<DeleteConfirmation> {
    let confirmation = orgs
        .delete(&query.organization_name, &admin.admin_email)
        .await?;
    Ok(ApiResponse::success(confirmation))
}
