mod common;

use anyhow::Result;
use common::{empty_request, json_request, oneshot};
use reqwest::StatusCode;

#[tokio::test]
async fn management_routes_require_a_jwt() -> Result<()> {
    let (status, body) = oneshot(empty_request("GET", "/api/v1/projects")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Missing Authorization header");

    let request = axum::http::Request::builder()
        .uri("/api/v1/users/me")
        .header("authorization", "Bearer not-a-jwt")
        .body(axum::body::Body::empty())?;
    let (status, _) = oneshot(request).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn dynamic_routes_reject_bad_tokens() -> Result<()> {
    let (status, body) = oneshot(empty_request("GET", "/api/v1/dynamic/orders/shop/garbage")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid access token.");
    Ok(())
}

#[tokio::test]
async fn collection_writes_need_a_document_id() -> Result<()> {
    let token = dynavo_api::crypto::issue_access_token(uuid::Uuid::new_v4())?;
    let uri = format!("/api/v1/dynamic/orders/shop/{}", token);

    for method in ["PUT", "PATCH", "DELETE"] {
        let (status, body) = oneshot(json_request(method, &uri, "{}")).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} should be rejected", method);
        assert_eq!(body["message"], "Document ID is required for this operation.");
    }
    Ok(())
}

#[tokio::test]
async fn login_validates_its_body() -> Result<()> {
    let (status, body) = oneshot(json_request("POST", "/api/v1/users/login", "{not json")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_JSON");

    let (status, body) = oneshot(json_request(
        "POST",
        "/api/v1/users/login",
        r#"{"email": " ", "password": ""}"#,
    ))
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email and password are required");
    Ok(())
}

#[tokio::test]
async fn unknown_routes_get_a_json_404() -> Result<()> {
    let (status, body) = oneshot(empty_request("GET", "/api/v2/nothing")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    Ok(())
}
