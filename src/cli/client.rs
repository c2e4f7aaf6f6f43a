use anyhow::{anyhow, bail, Context};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::config::{load_session, Session};

/// Thin JSON client for the API. Error envelopes become `anyhow` errors
/// carrying the server's message.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Client for the configured server without credentials
    pub fn anonymous() -> anyhow::Result<Self> {
        let session = load_session()?;
        Self::new(&session.server_url, None)
    }

    /// Client carrying the stored JWT; fails when not logged in
    pub fn authenticated() -> anyhow::Result<Self> {
        let session = load_session()?;
        Self::from_session(&session)
    }

    pub fn from_session(session: &Session) -> anyhow::Result<Self> {
        let token = session
            .active_token()
            .ok_or_else(|| anyhow!("Not logged in. Run `dynavo auth login` first"))?;
        Self::new(&session.server_url, Some(token.to_string()))
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<Value> {
        send(self.request(Method::GET, path).query(query)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> anyhow::Result<Value> {
        send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> anyhow::Result<Value> {
        send(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> anyhow::Result<Value> {
        send(self.request(Method::PATCH, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> anyhow::Result<Value> {
        send(self.request(Method::DELETE, path)).await
    }
}

async fn send(builder: RequestBuilder) -> anyhow::Result<Value> {
    let response = builder.send().await.context("Request failed")?;
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if !status.is_success() {
        bail!("{} ({})", error_message(&body), status.as_u16());
    }
    Ok(body)
}

pub fn error_message(body: &Value) -> String {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Request failed")
        .to_string();
    match body.get("field_errors").and_then(Value::as_object) {
        Some(fields) if !fields.is_empty() => {
            let details: Vec<String> = fields
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v.as_str().unwrap_or_default()))
                .collect();
            format!("{} [{}]", message, details.join("; "))
        }
        _ => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absolute_urls_are_kept() {
        let client = ApiClient::new("http://localhost:8000/", None).unwrap();
        assert_eq!(client.url("/api/v1/projects"), "http://localhost:8000/api/v1/projects");
        assert_eq!(client.url("https://other.example/x"), "https://other.example/x");
    }

    #[test]
    fn error_message_includes_field_errors() {
        let body = json!({"message": "Validation Error", "field_errors": {"email": "email is required"}});
        assert_eq!(error_message(&body), "Validation Error [email: email is required]");
        assert_eq!(error_message(&Value::Null), "Request failed");
    }

    #[test]
    fn authenticated_client_needs_a_token() {
        assert!(ApiClient::from_session(&Session::default()).is_err());
    }
}
