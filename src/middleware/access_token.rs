use axum::{
    extract::{Path, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::crypto::resolve_access_token;
use crate::error::ApiError;

/// Owner of the dynamic endpoint being called, decoded from the URL token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DynamicOwner(pub Uuid);

/// Decode the `:token` path segment. The owner is placed on the request for
/// handlers and on the response for the request log.
pub async fn resolve_owner_middleware(
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Response {
    let owner = match params.get("token").map(|t| resolve_access_token(t)) {
        Some(Ok(owner_id)) => DynamicOwner(owner_id),
        _ => return ApiError::bad_request("Invalid access token.").into_response(),
    };

    request.extensions_mut().insert(owner);
    let mut response = next.run(request).await;
    response.extensions_mut().insert(owner);
    response
}
