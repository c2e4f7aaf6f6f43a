use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config;
use crate::error::ApiError;
use crate::handlers::{self, dynamic, protected, public};
use crate::middleware::{jwt_auth_middleware, rate_limit_middleware, request_log_middleware, resolve_owner_middleware};

/// Full HTTP surface of the API server
pub fn app() -> Router {
    let settings = config::config();

    let router = Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(public_routes())
        // JWT protected
        .merge(protected_routes())
        // Access token in the URL
        .merge(dynamic_routes())
        .fallback(|| async { ApiError::not_found("Route not found") })
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(settings.api.max_request_size_bytes));

    let router = if settings.api.enable_response_compression {
        router.layer(CompressionLayer::new())
    } else {
        router
    };

    let router = if settings.security.enable_cors {
        router.layer(cors_layer(&settings.security.cors_origins))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

fn public_routes() -> Router {
    Router::new()
        .route("/api/v1/users/register", post(public::register_post))
        .route("/api/v1/users/login", post(public::login_post))
}

fn protected_routes() -> Router {
    use protected::{logs, permissions, projects, schemas, users};

    Router::new()
        .route(
            "/api/v1/users/me",
            get(users::me_get).put(users::me_put).delete(users::me_delete),
        )
        .route("/api/v1/users/me/activity", get(users::activity_get))
        .route("/api/v1/projects", get(projects::project_list).post(projects::project_post))
        .route(
            "/api/v1/projects/:project",
            get(projects::project_get).delete(projects::project_delete),
        )
        .route("/api/v1/schemas", get(schemas::schema_list).post(schemas::schema_post))
        .route(
            "/api/v1/schemas/:id",
            get(schemas::schema_get)
                .put(schemas::schema_put)
                .delete(schemas::schema_delete),
        )
        .route("/api/v1/permissions/:project", get(permissions::permission_list))
        .route(
            "/api/v1/permissions/:project/:collection",
            get(permissions::permission_get)
                .put(permissions::permission_put)
                .delete(permissions::permission_delete),
        )
        .route("/api/v1/logs", get(logs::log_list))
        .route("/api/v1/logs/stats", get(logs::log_stats))
        .route_layer(from_fn(jwt_auth_middleware))
}

/// Layers run outermost first: request log, owner resolution, rate limit
fn dynamic_routes() -> Router {
    Router::new()
        .route(
            "/api/v1/dynamic/:schema/:project/:token",
            get(dynamic::collection_get)
                .post(dynamic::collection_post)
                .put(dynamic::document_id_required)
                .patch(dynamic::document_id_required)
                .delete(dynamic::document_id_required),
        )
        .route(
            "/api/v1/dynamic/:schema/:project/:token/:document_id",
            get(dynamic::document_get)
                .put(dynamic::document_put)
                .patch(dynamic::document_patch)
                .delete(dynamic::document_delete),
        )
        .route_layer(from_fn(rate_limit_middleware))
        .route_layer(from_fn(resolve_owner_middleware))
        .route_layer(from_fn(request_log_middleware))
}
