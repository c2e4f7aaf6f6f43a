use axum::{
    extract::{rejection::JsonRejection, Path},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::database::models::PermissionRecord;
use crate::dynamic::AccessPolicy;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::{PermissionInput, PermissionService, ProjectService};

/// GET /api/v1/permissions/:project
pub async fn permission_list(
    Extension(auth): Extension<AuthUser>,
    Path(project): Path<String>,
) -> ApiResult<Vec<PermissionRecord>> {
    let project = ProjectService::new().await?.require(auth.id, &project).await?;
    let records = PermissionService::new().await?.list(auth.id, project.id).await?;
    Ok(ApiResponse::success(records))
}

/// GET /api/v1/permissions/:project/:collection
///
/// Returns the effective policy, which is full access when nothing is stored.
pub async fn permission_get(
    Extension(auth): Extension<AuthUser>,
    Path((project, collection)): Path<(String, String)>,
) -> ApiResult<AccessPolicy> {
    let project = ProjectService::new().await?.require(auth.id, &project).await?;
    let policy = PermissionService::new()
        .await?
        .resolve(auth.id, project.id, &collection)
        .await?;
    Ok(ApiResponse::success(policy))
}

/// PUT /api/v1/permissions/:project/:collection
pub async fn permission_put(
    Extension(auth): Extension<AuthUser>,
    Path((project, collection)): Path<(String, String)>,
    payload: Result<Json<PermissionInput>, JsonRejection>,
) -> ApiResult<PermissionRecord> {
    let Json(input) = payload?;
    let project = ProjectService::new().await?.require(auth.id, &project).await?;
    let record = PermissionService::new()
        .await?
        .upsert(auth.id, project.id, &collection, input)
        .await?;
    tracing::info!("Permission for '{}' in project {} set to role '{}'", collection, project.id, record.role);
    Ok(ApiResponse::success(record))
}

/// DELETE /api/v1/permissions/:project/:collection
pub async fn permission_delete(
    Extension(auth): Extension<AuthUser>,
    Path((project, collection)): Path<(String, String)>,
) -> ApiResult<Value> {
    let project = ProjectService::new().await?.require(auth.id, &project).await?;
    let removed = PermissionService::new()
        .await?
        .delete(auth.id, project.id, &collection)
        .await?;
    if !removed {
        return Err(crate::error::ApiError::not_found(format!(
            "No permission stored for '{}'",
            collection
        )));
    }
    Ok(ApiResponse::success(json!({ "collection": collection, "deleted": true })))
}
