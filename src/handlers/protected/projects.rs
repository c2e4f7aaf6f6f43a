use axum::{
    extract::{rejection::JsonRejection, Path},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::database::models::Project;
use crate::dynamic::{ConnectionCache, ModelCache};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::{activity_service, ProjectService, ProjectSummary};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub connection_uri: String,
}

/// POST /api/v1/projects
pub async fn project_post(
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> ApiResult<ProjectSummary> {
    let Json(body) = payload?;
    let service = ProjectService::new().await?;
    let project = service.create(auth.id, &body.name, &body.connection_uri).await?;
    let summary = service.summarize(&project)?;

    activity_service::spawn_record(auth.id, "Project created");

    // Warm the connection so the first dynamic request does not pay for it
    let uri = body.connection_uri.trim().to_string();
    let fallback_db = project.name.clone();
    tokio::spawn(async move {
        match ConnectionCache::global().get(&uri, &fallback_db).await {
            Ok(_) => info!("Connected to database for project '{}'", fallback_db),
            Err(e) => warn!("Could not connect to database for project '{}': {}", fallback_db, e),
        }
    });

    Ok(ApiResponse::created(summary))
}

/// GET /api/v1/projects
pub async fn project_list(Extension(auth): Extension<AuthUser>) -> ApiResult<Vec<ProjectSummary>> {
    let service = ProjectService::new().await?;
    let projects = service.list(auth.id).await?;
    let summaries = projects
        .iter()
        .map(|p| service.summarize(p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ApiResponse::success(summaries))
}

/// GET /api/v1/projects/:project
pub async fn project_get(Extension(auth): Extension<AuthUser>, Path(name): Path<String>) -> ApiResult<ProjectSummary> {
    let service = ProjectService::new().await?;
    let project = service.require(auth.id, &name).await?;
    Ok(ApiResponse::success(service.summarize(&project)?))
}

/// DELETE /api/v1/projects/:project
pub async fn project_delete(Extension(auth): Extension<AuthUser>, Path(name): Path<String>) -> ApiResult<Value> {
    let service = ProjectService::new().await?;
    let project = service.delete(auth.id, &name).await?;

    release_project(&service, &project).await;
    activity_service::spawn_record(auth.id, "Project deleted");

    Ok(ApiResponse::success(json!({ "deleted_id": project.id, "name": project.name })))
}

/// Drop the cached models and tenant clients of a deleted project
pub async fn release_project(service: &ProjectService, project: &Project) {
    ModelCache::global().invalidate_project(project.id).await;
    match service.connection_uri(project) {
        Ok(uri) => {
            ConnectionCache::global().evict(&uri).await;
        }
        Err(e) => warn!("Could not open connection string of deleted project {}: {}", project.id, e),
    }
}
