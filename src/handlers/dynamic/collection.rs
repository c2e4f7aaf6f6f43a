use axum::{
    extract::{rejection::JsonRejection, Path, Query},
    Extension, Json,
};
use serde_json::Value;

use super::{render, DynamicContext};
use crate::dynamic::populate::populate;
use crate::error::ApiError;
use crate::filter::{Filter, FilterData};
use crate::middleware::{ApiResponse, ApiResult, DynamicOwner, Paginated, Pagination};
use crate::types::Operation;

/// GET /api/v1/dynamic/:schema/:project/:token
pub async fn collection_get(
    Extension(owner): Extension<DynamicOwner>,
    Path((schema, project, _token)): Path<(String, String, String)>,
    Query(data): Query<FilterData>,
) -> Result<Paginated<Value>, ApiError> {
    let ctx = DynamicContext::resolve(owner.0, &schema, &project).await?;
    ctx.authorize(Operation::Read)?;

    let mut filter = Filter::new(ctx.model.schema());
    filter.assign(&data, &ctx.policy.scope(Operation::Read))?;
    let window = filter.window();

    let (mut docs, total) = ctx.model.find(&filter.to_query()).await?;
    populate(ctx.model.database(), ctx.model.schema(), &mut docs).await;

    Ok(Paginated {
        data: docs.into_iter().map(render).collect(),
        pagination: Pagination::new(total, window.page, window.limit),
    })
}

/// POST /api/v1/dynamic/:schema/:project/:token
pub async fn collection_post(
    Extension(owner): Extension<DynamicOwner>,
    Path((schema, project, _token)): Path<(String, String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = payload?;
    let ctx = DynamicContext::resolve(owner.0, &schema, &project).await?;
    ctx.authorize(Operation::Create)?;

    let validated = ctx.prepare_write(Operation::Create, &body)?;
    let created = ctx.model.insert(validated.set).await?;

    Ok(ApiResponse::created(render(created)))
}

/// PUT, PATCH and DELETE without a document id
pub async fn document_id_required() -> ApiError {
    ApiError::bad_request("Document ID is required for this operation.")
}
