use axum::{
    extract::{rejection::JsonRejection, Path, Query},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dynamic::FieldDefinition;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::{activity_service, ProjectService, SchemaService, SchemaSummary};

#[derive(Debug, Deserialize)]
pub struct CreateSchemaRequest {
    pub project: String,
    pub name: String,
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSchemaRequest {
    pub name: Option<String>,
    pub fields: Option<Vec<FieldDefinition>>,
}

#[derive(Debug, Deserialize)]
pub struct SchemaListQuery {
    pub project: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedSchema {
    pub schema: SchemaSummary,
    pub url: String,
}

fn parse_schema_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request("Invalid schema id"))
}

/// POST /api/v1/schemas
pub async fn schema_post(
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<CreateSchemaRequest>, JsonRejection>,
) -> ApiResult<CreatedSchema> {
    let Json(body) = payload?;
    let project = ProjectService::new().await?.require(auth.id, &body.project).await?;

    let service = SchemaService::new().await?;
    let record = service.create(auth.id, &project, &body.name, body.fields).await?;
    let url = service.endpoint_url(auth.id, &project.name, &record.name)?;

    activity_service::spawn_record(auth.id, "Schema created");
    Ok(ApiResponse::created(CreatedSchema {
        schema: SchemaSummary::from(&record),
        url,
    }))
}

/// GET /api/v1/schemas?project=
pub async fn schema_list(
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<SchemaListQuery>,
) -> ApiResult<Vec<SchemaSummary>> {
    let project_id = match query.project.as_deref() {
        Some(name) => Some(ProjectService::new().await?.require(auth.id, name).await?.id),
        None => None,
    };
    let records = SchemaService::new().await?.list(auth.id, project_id).await?;
    Ok(ApiResponse::success(records.iter().map(SchemaSummary::from).collect()))
}

/// GET /api/v1/schemas/:id
pub async fn schema_get(Extension(auth): Extension<AuthUser>, Path(id): Path<String>) -> ApiResult<SchemaSummary> {
    let record = SchemaService::new().await?.find(auth.id, parse_schema_id(&id)?).await?;
    Ok(ApiResponse::success(SchemaSummary::from(&record)))
}

/// PUT /api/v1/schemas/:id
pub async fn schema_put(
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateSchemaRequest>, JsonRejection>,
) -> ApiResult<SchemaSummary> {
    let id = parse_schema_id(&id)?;
    let Json(body) = payload?;
    if body.name.is_none() && body.fields.is_none() {
        return Err(ApiError::bad_request("Nothing to update. Provide name and/or fields"));
    }

    let record = SchemaService::new()
        .await?
        .update(auth.id, id, body.name.as_deref(), body.fields)
        .await?;
    activity_service::spawn_record(auth.id, "Schema updated");
    Ok(ApiResponse::success(SchemaSummary::from(&record)))
}

/// DELETE /api/v1/schemas/:id
///
/// The collection in the owner's MongoDB is left in place.
pub async fn schema_delete(Extension(auth): Extension<AuthUser>, Path(id): Path<String>) -> ApiResult<Value> {
    let record = SchemaService::new().await?.delete(auth.id, parse_schema_id(&id)?).await?;
    activity_service::spawn_record(auth.id, "Schema deleted");
    Ok(ApiResponse::success(json!({ "deleted_id": record.id, "name": record.name })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_ids_must_be_uuids() {
        assert!(parse_schema_id("not-a-uuid").is_err());
        assert!(parse_schema_id(&Uuid::new_v4().to_string()).is_ok());
    }

    #[test]
    fn create_request_reads_field_definitions() {
        let body: CreateSchemaRequest = serde_json::from_value(json!({
            "project": "shop",
            "name": "orders",
            "fields": [{"name": "total", "type": "number", "required": true}]
        }))
        .unwrap();
        assert_eq!(body.fields.len(), 1);
        assert_eq!(body.fields[0].name, "total");
    }
}
