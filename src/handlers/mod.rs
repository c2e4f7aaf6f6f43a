// handlers/mod.rs - handler tiers
//
// Public (no auth) → Protected (JWT) → Dynamic (access token in the URL)
pub mod dynamic;
pub mod protected;
pub mod public;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::manager::DatabaseManager;

/// GET / - service description
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Dynavo API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Turns field definitions into CRUD endpoints over your own MongoDB",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "users": "/api/v1/users/register, /api/v1/users/login (public), /api/v1/users/me (protected)",
                "projects": "/api/v1/projects[/:project] (protected)",
                "schemas": "/api/v1/schemas[/:id] (protected)",
                "permissions": "/api/v1/permissions/:project[/:collection] (protected)",
                "logs": "/api/v1/logs, /api/v1/logs/stats (protected)",
                "dynamic": "/api/v1/dynamic/:schema/:project/:token[/:document_id] (access token)"
            }
        }
    }))
}

/// GET /health - platform database ping
pub async fn health() -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "ok" }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            let mut data = json!({ "status": "degraded", "timestamp": now });
            if crate::is_development!() {
                data["database_error"] = json!(e.to_string());
            }
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "success": false, "error": "database unavailable", "data": data })),
            )
        }
    }
}
