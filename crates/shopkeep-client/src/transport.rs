//! # HTTP Transport
//!
//! The seam between [`ApiClient`](crate::http::ApiClient) and the network.
//!
//! ## Layering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ApiClient        bearer token, 401 refresh, retry, GET cache          │
//! │      │                                                                  │
//! │      ▼  HttpRequest { method, path, query, body, bearer }               │
//! │  ┌───────────────────────────────┐                                      │
//! │  │ dyn HttpTransport             │                                      │
//! │  │  ├── ReqwestTransport (real)  │  one attempt, no retries, no auth   │
//! │  │  └── MockTransport   (tests)  │                                      │
//! │  └───────────────────────────────┘                                      │
//! │      │                                                                  │
//! │      ▼  Ok(HttpResponse { status, body })  - ANY status, 4xx/5xx too    │
//! │         Err(Network | Timeout | RequestCanceled) - nothing came back    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ApiSettings;
use crate::error::{ClientError, ClientResult};

// =============================================================================
// Request / Response
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Whether sending the request twice has the same effect as once.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Method::Post | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One outgoing request, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path such as `/products/count`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        HttpRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }

    /// Value of query parameter `name`, if present.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// What came back. Bodies that are not JSON arrive as `Value::String`,
/// empty bodies as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16, body: Value) -> Self {
        HttpResponse { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The server's own error text: `message`, then `error`, then a bare
    /// string body.
    pub fn server_message(&self) -> Option<String> {
        match &self.body {
            Value::Object(map) => ["message", "error", "msg"]
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(|v| v.as_str().map(str::to_string)),
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// Parses a raw body: empty → `Null`, JSON → value, anything else → string.
    pub fn parse_body(text: &str) -> Value {
        if text.trim().is_empty() {
            return Value::Null;
        }
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    }
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Sends one request, once.
///
/// Implementations return `Ok` for every response that arrived, whatever
/// its status. `Err` means no response: network, timeout or a dropped request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse>;
}

// =============================================================================
// Reqwest Transport
// =============================================================================

/// [`HttpTransport`] over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(settings: &ApiSettings) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(ReqwestTransport {
            client,
            base_url: Self::normalize_base(&settings.base_url)?,
            timeout: settings.timeout(),
        })
    }

    /// `Url::join` drops the last segment unless the base ends in `/`.
    fn normalize_base(raw: &str) -> ClientResult<Url> {
        let trimmed = raw.trim();
        let with_slash = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{}/", trimmed)
        };
        Ok(Url::parse(&with_slash)?)
    }

    pub fn url_for(&self, path: &str) -> ClientResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn map_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout.as_secs())
        } else if err.is_connect() {
            ClientError::Network(err.to_string())
        } else if err.is_request() {
            ClientError::RequestCanceled(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        let url = self.url_for(&request.path)?;
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.into(), url)
            .header(reqwest::header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.map_error(e))?;

        debug!(status, bytes = text.len(), "Response received");
        Ok(HttpResponse::new(status, HttpResponse::parse_body(&text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_join_keeps_base_path() {
        let settings = ApiSettings {
            base_url: "http://localhost:5000/api".into(),
            timeout_secs: 5,
        };
        let transport = ReqwestTransport::new(&settings).unwrap();
        assert_eq!(
            transport.url_for("/products/count").unwrap().as_str(),
            "http://localhost:5000/api/products/count"
        );
    }

    #[test]
    fn test_server_message_lookup() {
        let resp = HttpResponse::new(400, json!({"message": "Product ID already exists"}));
        assert_eq!(
            resp.server_message().as_deref(),
            Some("Product ID already exists")
        );

        let resp = HttpResponse::new(400, json!({"error": "Invalid supplier"}));
        assert_eq!(resp.server_message().as_deref(), Some("Invalid supplier"));

        let resp = HttpResponse::new(502, Value::String("Bad Gateway".into()));
        assert_eq!(resp.server_message().as_deref(), Some("Bad Gateway"));

        assert!(HttpResponse::new(500, Value::Null).server_message().is_none());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(HttpResponse::parse_body(""), Value::Null);
        assert_eq!(HttpResponse::parse_body("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(
            HttpResponse::parse_body("printed"),
            Value::String("printed".into())
        );
    }

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::new(Method::Get, "/products")
            .with_query(vec![("search".into(), "rice".into())])
            .with_bearer(Some("t".into()));
        assert_eq!(req.query_param("search"), Some("rice"));
        assert_eq!(req.query_param("skip"), None);
        assert_eq!(req.bearer.as_deref(), Some("t"));
    }
}
