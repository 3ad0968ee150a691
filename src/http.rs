//! HTTP client abstraction for talking to the batch API.
//!
//! This module defines the `HttpClient` trait to abstract HTTP request execution,
//! enabling testability with mock implementations.

use crate::config::ClientConfig;
use crate::error::{HarvestError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Body of an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    /// Serialized JSON document
    Json(String),
    /// File upload sent as `multipart/form-data` with a `purpose` field
    Multipart {
        file_name: String,
        purpose: String,
        bytes: Vec<u8>,
    },
}

/// An API call relative to the configured base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    /// Path including any query string, e.g. "/files?purpose=batch"
    pub path: String,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(path: impl Into<String>, body: String) -> Self {
        Self {
            method: "POST".to_string(),
            path: path.into(),
            body: RequestBody::Json(body),
        }
    }

    pub fn post_multipart(
        path: impl Into<String>,
        file_name: impl Into<String>,
        purpose: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            method: "POST".to_string(),
            path: path.into(),
            body: RequestBody::Multipart {
                file_name: file_name.into(),
                purpose: purpose.into(),
                bytes,
            },
        }
    }

    /// Key used to match mock responses: "{method} {path}".
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into `HarvestError::Api`.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HarvestError::Api {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Trait for executing HTTP requests.
///
/// This abstraction allows for different implementations (production vs. testing)
/// and makes the pipeline testable without making real HTTP calls.
///
/// # Example
/// ```ignore
/// let client = ReqwestHttpClient::new(&ClientConfig::from_env())?;
/// let response = client.execute(&HttpRequest::get("/batches")).await?;
/// println!("Status: {}, Body: {}", response.status, response.body);
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// Execute an HTTP request.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The request fails due to network issues
    /// - The request times out
    /// - The URL is invalid
    ///
    /// Non-2xx responses are returned as `Ok`; callers decide what to do with them.
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    config: ClientConfig,
    headers: BTreeMap<String, String>,
}

impl ReqwestHttpClient {
    /// Create a client bound to `config`'s base URL, headers and timeout.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let headers = config.effective_headers();
        for (name, value) in &headers {
            reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HarvestError::InvalidConfig(format!("header '{}': {}", name, e)))?;
            reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| HarvestError::InvalidConfig(format!("header '{}': {}", name, e)))?;
        }
        Ok(Self {
            client: reqwest::Client::new(),
            config: config.clone(),
            headers,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = self.config.url(&request.path);

        tracing::debug!(
            url = %url,
            timeout_ms = self.config.timeout_ms,
            "Executing HTTP request"
        );

        let method = request.method.parse::<reqwest::Method>().map_err(|e| {
            tracing::error!(method = %request.method, error = %e, "Invalid HTTP method");
            anyhow::anyhow!("Invalid HTTP method '{}': {}", request.method, e)
        })?;

        let mut req = self
            .client
            .request(method, &url)
            .timeout(Duration::from_millis(self.config.timeout_ms));

        // Multipart sets its own boundary content type; a JSON one would clobber it
        let is_multipart = matches!(request.body, RequestBody::Multipart { .. });
        for (name, value) in &self.headers {
            if is_multipart && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            req = req.header(name.as_str(), value.as_str());
        }

        req = match &request.body {
            RequestBody::Empty => req,
            RequestBody::Json(body) => {
                let has_content_type = self
                    .headers
                    .keys()
                    .any(|name| name.eq_ignore_ascii_case("content-type"));
                if !has_content_type {
                    req = req.header("Content-Type", "application/json");
                }
                req.body(body.clone())
            }
            RequestBody::Multipart {
                file_name,
                purpose,
                bytes,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str("application/jsonl")?;
                let form = reqwest::multipart::Form::new()
                    .text("purpose", purpose.clone())
                    .part("file", part);
                tracing::trace!(body_len = bytes.len(), "Added multipart body");
                req.multipart(form)
            }
        };

        let response = req.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "HTTP request failed");
            e
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(
            status = status,
            response_len = body.len(),
            "HTTP request completed"
        );

        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Mock HTTP client for testing.
///
/// Allows configuring predetermined responses for specific requests without
/// making actual HTTP calls.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.add_response(
///     "GET /batches/batch_abc",
///     Ok(HttpResponse::ok(r#"{"id":"batch_abc","status":"completed"}"#)),
/// );
/// ```
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<Result<HttpResponse>>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub method: String,
    pub path: String,
    pub body: RequestBody,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predetermined response for a specific method and path.
    ///
    /// The key is formatted as "{method} {path}". Multiple responses can be
    /// added for the same key - they will be returned in FIFO order.
    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(response);
    }

    /// Shorthand for a 200 response with `body`.
    pub fn add_ok(&self, key: &str, body: impl Into<String>) {
        self.add_response(key, Ok(HttpResponse::ok(body)));
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls whose "{method} {path}" equals `key`.
    pub fn calls_to(&self, key: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| format!("{} {}", call.method, call.path) == key)
            .count()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.calls.lock().push(MockCall {
            method: request.method.clone(),
            path: request.path.clone(),
            body: request.body.clone(),
        });

        let key = request.key();
        let response = {
            let mut responses = self.responses.lock();
            match responses.get_mut(&key) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };

        response.unwrap_or_else(|| {
            Err(HarvestError::Other(anyhow::anyhow!(
                "No mock response configured for {}",
                key
            )))
        })
    }
}
