use axum::{extract::rejection::JsonRejection, Json};
use serde::{Deserialize, Serialize};

use crate::auth::{generate_jwt, Claims};
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::{activity_service, UserService};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
    pub expires_in: i64,
}

/// POST /api/v1/users/register
pub async fn register_post(payload: Result<Json<RegisterRequest>, JsonRejection>) -> ApiResult<User> {
    let Json(body) = payload?;
    let user = UserService::new()
        .await?
        .register(&body.email, &body.username, &body.password)
        .await?;

    tracing::info!("Registered user {}", user.id);
    activity_service::spawn_record(user.id, "User register");
    Ok(ApiResponse::created(user))
}

/// POST /api/v1/users/login
pub async fn login_post(payload: Result<Json<LoginRequest>, JsonRejection>) -> ApiResult<LoginResponse> {
    let Json(body) = payload?;
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let user = UserService::new().await?.authenticate(&body.email, &body.password).await?;

    let claims = Claims::new(user.id, user.email.clone());
    let token = generate_jwt(&claims)?;
    activity_service::spawn_record(user.id, "User login");

    Ok(ApiResponse::success(LoginResponse {
        token,
        expires_in: claims.expires_in(),
        user,
    }))
}
