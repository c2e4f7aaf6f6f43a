use axum::{
    extract::{rejection::JsonRejection, Query},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::projects::release_project;
use crate::database::models::{Activity, User};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::{activity_service, ActivityService, ProjectService, UserChanges, UserService};

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/users/me
pub async fn me_get(Extension(auth): Extension<AuthUser>) -> ApiResult<User> {
    let user = UserService::new().await?.find(auth.id).await?;
    Ok(ApiResponse::success(user))
}

/// PUT /api/v1/users/me
pub async fn me_put(
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<UserChanges>, JsonRejection>,
) -> ApiResult<User> {
    let Json(changes) = payload?;
    let user = UserService::new().await?.update(auth.id, changes).await?;
    activity_service::spawn_record(user.id, "User update");
    Ok(ApiResponse::success(user))
}

/// DELETE /api/v1/users/me
pub async fn me_delete(Extension(auth): Extension<AuthUser>) -> ApiResult<Value> {
    // Projects cascade with the user, so collect them first
    let projects = ProjectService::new().await?;
    let owned = projects.list(auth.id).await?;
    UserService::new().await?.delete(auth.id).await?;
    for project in &owned {
        release_project(&projects, project).await;
    }
    tracing::info!("Deleted user {} and {} projects", auth.id, owned.len());
    Ok(ApiResponse::success(json!({ "deleted_id": auth.id })))
}

/// GET /api/v1/users/me/activity?limit=
pub async fn activity_get(
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Vec<Activity>> {
    let activities = ActivityService::new()
        .await?
        .list(auth.id, query.limit.unwrap_or(20))
        .await?;
    Ok(ApiResponse::success(activities))
}
