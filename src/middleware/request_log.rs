use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::warn;

use super::access_token::DynamicOwner;
use crate::config;
use crate::database::models::NewRequestLog;
use crate::services::LogService;

const TOKEN_SEGMENT: usize = 6;

/// Record every dynamic request after it completes. The write runs in the
/// background and its failures are only logged.
pub async fn request_log_middleware(request: Request, next: Next) -> Response {
    if !config::config().api.enable_request_logging {
        return next.run(request).await;
    }

    let method = request.method().to_string();
    let endpoint = redact_token(request.uri().path());
    let ip = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0),
    );

    let response = next.run(request).await;

    let entry = NewRequestLog {
        owner_id: response.extensions().get::<DynamicOwner>().map(|o| o.0),
        endpoint,
        method,
        status: response.status().as_u16(),
        ip,
    };
    tokio::spawn(async move {
        let result = match LogService::new().await {
            Ok(service) => service.record(&entry).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to record request log for {}: {}", entry.endpoint, e);
        }
    });

    response
}

/// `/api/v1/dynamic/:schema/:project/:token[/:id]` with the token masked
pub fn redact_token(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').collect();
    if segments.get(3) == Some(&"dynamic") && segments.len() > TOKEN_SEGMENT {
        segments[TOKEN_SEGMENT] = "***";
    }
    segments.join("/")
}

/// First `x-forwarded-for` entry, else the peer address
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .or_else(|| peer.map(|p| p.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_is_masked() {
        assert_eq!(
            redact_token("/api/v1/dynamic/orders/shop/abc:def/65a1"),
            "/api/v1/dynamic/orders/shop/***/65a1"
        );
        assert_eq!(redact_token("/api/v1/dynamic/orders/shop/abc"), "/api/v1/dynamic/orders/shop/***");
        assert_eq!(redact_token("/api/v1/projects"), "/api/v1/projects");
    }

    #[test]
    fn forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.9"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.7"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
