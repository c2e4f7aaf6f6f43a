use axum::{extract::Query, Extension};

use crate::config;
use crate::database::models::RequestLog;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Paginated, Pagination};
use crate::services::{LogQuery, LogService, LogStats};

/// GET /api/v1/logs?page&limit&search&method&status
pub async fn log_list(
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<LogQuery>,
) -> Result<Paginated<RequestLog>, ApiError> {
    let max_limit = i64::from(config::config().api.max_page_size);
    let (logs, total) = LogService::new().await?.list(auth.id, &query, max_limit).await?;

    let page = query.page() as u64;
    let limit = query.limit(max_limit) as u64;
    Ok(Paginated {
        data: logs,
        pagination: Pagination::new(total.max(0) as u64, page, limit),
    })
}

/// GET /api/v1/logs/stats
pub async fn log_stats(Extension(auth): Extension<AuthUser>) -> ApiResult<LogStats> {
    let stats = LogService::new().await?.stats(auth.id).await?;
    Ok(ApiResponse::success(stats))
}
