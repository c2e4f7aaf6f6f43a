use axum::{
    extract::{rejection::JsonRejection, Path, Query},
    Extension, Json,
};
use bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{render, DynamicContext};
use crate::dynamic::populate::populate;
use crate::error::ApiError;
use crate::filter::projection_for;
use crate::middleware::{ApiResponse, ApiResult, DynamicOwner};
use crate::types::Operation;

type DocumentPath = Path<(String, String, String, String)>;

#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
    pub select: Option<String>,
}

fn parse_document_id(raw: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw.trim()).map_err(|_| ApiError::bad_request("Invalid document ID format."))
}

fn not_found(id: &ObjectId) -> ApiError {
    ApiError::not_found(format!("Document with ID {} not found.", id.to_hex()))
}

/// GET /api/v1/dynamic/:schema/:project/:token/:document_id
pub async fn document_get(
    Extension(owner): Extension<DynamicOwner>,
    Path((schema, project, _token, document_id)): DocumentPath,
    Query(query): Query<DocumentQuery>,
) -> ApiResult<Value> {
    let ctx = DynamicContext::resolve(owner.0, &schema, &project).await?;
    ctx.authorize(Operation::Read)?;
    let id = parse_document_id(&document_id)?;

    let projection = projection_for(query.select.as_deref(), &ctx.policy.scope(Operation::Read))?;
    let doc = ctx.model.find_by_id(id, projection).await?.ok_or_else(|| not_found(&id))?;

    let mut docs = [doc];
    populate(ctx.model.database(), ctx.model.schema(), &mut docs).await;
    let [doc] = docs;
    Ok(ApiResponse::success(render(doc)))
}

/// PUT /api/v1/dynamic/:schema/:project/:token/:document_id
pub async fn document_put(
    Extension(owner): Extension<DynamicOwner>,
    Path((schema, project, _token, document_id)): DocumentPath,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = payload?;
    let ctx = DynamicContext::resolve(owner.0, &schema, &project).await?;
    ctx.authorize(Operation::Replace)?;
    let id = parse_document_id(&document_id)?;

    let validated = ctx.prepare_write(Operation::Replace, &body)?;
    let updated = ctx.model.replace(id, validated).await?.ok_or_else(|| not_found(&id))?;
    Ok(ApiResponse::success(render(updated)))
}

/// PATCH /api/v1/dynamic/:schema/:project/:token/:document_id
pub async fn document_patch(
    Extension(owner): Extension<DynamicOwner>,
    Path((schema, project, _token, document_id)): DocumentPath,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = payload?;
    let ctx = DynamicContext::resolve(owner.0, &schema, &project).await?;
    ctx.authorize(Operation::Patch)?;
    let id = parse_document_id(&document_id)?;

    let validated = ctx.prepare_write(Operation::Patch, &body)?;
    let updated = ctx.model.patch(id, validated.set).await?.ok_or_else(|| not_found(&id))?;
    Ok(ApiResponse::success(render(updated)))
}

/// DELETE /api/v1/dynamic/:schema/:project/:token/:document_id
pub async fn document_delete(
    Extension(owner): Extension<DynamicOwner>,
    Path((schema, project, _token, document_id)): DocumentPath,
) -> ApiResult<Value> {
    let ctx = DynamicContext::resolve(owner.0, &schema, &project).await?;
    ctx.authorize(Operation::Delete)?;
    let id = parse_document_id(&document_id)?;

    if !ctx.model.delete(id).await? {
        return Err(ApiError::not_found("Document not found or already deleted."));
    }
    Ok(ApiResponse::success(json!({ "deleted_id": id.to_hex() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ids_must_be_object_ids() {
        let err = parse_document_id("12345").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.message(), "Invalid document ID format.");

        let oid = ObjectId::new();
        assert_eq!(parse_document_id(&oid.to_hex()).unwrap(), oid);
    }

    #[test]
    fn missing_document_message() {
        let oid = ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap();
        assert_eq!(not_found(&oid).message(), "Document with ID 65a1b2c3d4e5f60718293a4b not found.");
    }
}
