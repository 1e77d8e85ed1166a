//! Common utilities for service clients
//!
//! This module provides shared HTTP plumbing for the backend client and the
//! endpoint resolver.

use std::fmt;
use std::time::Duration;

use reqwest::{header, Client};

use crate::error::{ErrorContext, Result, ServiceError};
use crate::session::SessionContext;

/// Header carrying the stable session id
pub const SESSION_HEADER: &str = "X-Session-ID";

/// Header carrying the current conversation id
pub const CONVERSATION_HEADER: &str = "X-Conversation-ID";

/// Header carrying the per-call request id
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// UserAgent structure for identifying the client to the backend
#[derive(Debug, Clone)]
pub struct UserAgent {
    /// Application name
    pub app_name: String,

    /// Version string
    pub version: String,

    /// Optional extra info
    pub extra: Option<String>,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            app_name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: Some("cv-backend".to_string()),
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.version)?;

        if let Some(ref extra) = self.extra {
            write!(f, " ({})", extra)?;
        }

        write!(f, " rust")
    }
}

/// Build a standard HTTP client with default settings
pub fn build_http_client(
    user_agent: &UserAgent,
    timeout: Duration,
    compression: bool,
    extra_headers: header::HeaderMap,
) -> Result<Client> {
    let mut headers = extra_headers;
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_str(&user_agent.to_string())
            .map_err(|e| ServiceError::configuration(format!("Invalid user agent: {}", e)))?,
    );

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .gzip(compression)
        .build()
        .map_err(|e| ServiceError::configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Tracing headers attached to every backend request of a session
pub fn session_headers(session: &SessionContext, request_id: &str) -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();
    let pairs = [
        (SESSION_HEADER, session.session_id().to_string()),
        (CONVERSATION_HEADER, session.conversation_id()),
        (REQUEST_ID_HEADER, request_id.to_string()),
    ];

    for (name, value) in pairs {
        // ids are generated or caller-chosen; skip anything that is not a valid header value
        if let Ok(value) = header::HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
    headers
}

/// Create error context for a backend request
pub fn create_error_context(endpoint: &str, request_id: &str, session: &SessionContext) -> ErrorContext {
    ErrorContext::for_service("cv-backend")
        .endpoint(endpoint)
        .request_id(request_id)
        .with("session_id", session.session_id())
}

/// Read a response body.
///
/// A body cut short or timed out is a transport failure, retried and
/// counted like any other.
pub async fn read_body(response: reqwest::Response) -> Result<String> {
    response.text().await.map_err(|e| {
        if e.is_timeout() {
            ServiceError::timeout(format!("reading response body timed out: {}", e))
        } else {
            ServiceError::network(format!("failed to read response body: {}", e))
        }
    })
}

/// Read an error response body for diagnostics, never failing
pub async fn read_error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(body) => body,
        Err(e) => format!("<unreadable body: {}>", e),
    }
}
