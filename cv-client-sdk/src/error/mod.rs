//! Error handling for the CV client SDK
//!
//! This module provides the error system used inside the client:
//! - `ServiceError` classifies every failure the client can run into
//! - `ErrorContext` carries request details for debugging
//! - `ErrorKind` / `QueryError` are the tagged forms handed to callers
//!   inside result objects, so nobody has to string-match error text

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod mapping;

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Main error type for the SDK
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Generic transport errors (redirect loops, broken bodies, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// The backend could not be reached at all
    #[error("cannot connect: {0}")]
    Connect(String),

    /// The request did not complete in time
    #[error("timeout: {0}")]
    Timeout(String),

    /// Non-success HTTP status; `body` is already truncated
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Every payload shape was rejected by the backend
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// Input rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Response parsing errors
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The session's circuit breaker is open
    #[error("{0}")]
    CircuitBroken(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Errors with additional context
    #[error("{inner}")]
    WithContext {
        inner: Box<ServiceError>,
        context: ErrorContext,
    },
}

impl ServiceError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        ServiceError::Network(message.into())
    }

    /// Create a connection error
    pub fn connect(message: impl Into<String>) -> Self {
        ServiceError::Connect(message.into())
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        ServiceError::Timeout(message.into())
    }

    /// Create an HTTP status error
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        ServiceError::Http {
            status,
            body: body.into(),
        }
    }

    /// Create a negotiation error
    pub fn negotiation(message: impl Into<String>) -> Self {
        ServiceError::Negotiation(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    /// Create a parsing error
    pub fn parsing(message: impl Into<String>) -> Self {
        ServiceError::Parsing(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration(message.into())
    }

    /// Create a circuit broken error
    pub fn circuit_broken(message: impl Into<String>) -> Self {
        ServiceError::CircuitBroken(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    /// Add context to an existing error
    pub fn with_context(self, context: ErrorContext) -> Self {
        ServiceError::WithContext {
            inner: Box::new(self),
            context,
        }
    }

    /// Add a single context key/value to an existing error
    pub fn with_context_value(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        match self {
            ServiceError::WithContext { inner, mut context } => {
                context.add(key, value);
                ServiceError::WithContext { inner, context }
            }
            other => {
                let mut context = ErrorContext::new();
                context.add(key, value);
                other.with_context(context)
            }
        }
    }

    /// The error with every context layer peeled off
    pub fn root(&self) -> &ServiceError {
        match self {
            ServiceError::WithContext { inner, .. } => inner.root(),
            other => other,
        }
    }

    /// Get the context attached to this error, if any
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            ServiceError::WithContext { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ServiceError::Http { status, .. } => Some(*status),
            ServiceError::WithContext { inner, context } => {
                inner.status_code().or(context.status_code)
            }
            _ => None,
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Network(_) => true,
            ServiceError::Connect(_) => true,
            ServiceError::Timeout(_) => true,
            ServiceError::Http { status, .. } => mapping::is_retryable_code(*status),
            ServiceError::WithContext { inner, .. } => inner.is_retryable(),
            _ => false,
        }
    }

    /// Check if this is a permanent error (not retryable)
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Whether this failure should count against the session's circuit breaker.
    ///
    /// Only failures observed on the wire count. Validation problems, open
    /// circuits and local configuration mistakes say nothing about the
    /// health of the remote service.
    pub fn counts_toward_breaker(&self) -> bool {
        match self {
            ServiceError::Network(_)
            | ServiceError::Connect(_)
            | ServiceError::Timeout(_)
            | ServiceError::Http { .. }
            | ServiceError::Negotiation(_) => true,
            ServiceError::WithContext { inner, .. } => inner.counts_toward_breaker(),
            _ => false,
        }
    }

    /// The tagged kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            ServiceError::Network(_) => ErrorKind::Network,
            ServiceError::Connect(_) => ErrorKind::Connect,
            ServiceError::Timeout(_) => ErrorKind::Timeout,
            ServiceError::Http { status, .. } => ErrorKind::Http { status: *status },
            ServiceError::Negotiation(_) => ErrorKind::Negotiation,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Parsing(_) => ErrorKind::Parsing,
            ServiceError::Configuration(_) => ErrorKind::Configuration,
            ServiceError::CircuitBroken(_) => ErrorKind::CircuitOpen,
            ServiceError::Internal(_) | ServiceError::WithContext { .. } => ErrorKind::Internal,
        }
    }
}

/// Error context information
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Service that generated the error
    pub service: String,

    /// When the error was observed
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    /// HTTP status code if applicable
    pub status_code: Option<u16>,

    /// Request ID for tracing
    pub request_id: Option<String>,

    /// Endpoint that was called
    pub endpoint: Option<String>,

    /// Additional context data
    pub data: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            service: "cv-backend".to_string(),
            timestamp: Some(chrono::Utc::now()),
            status_code: None,
            request_id: None,
            endpoint: None,
            data: HashMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new error context for a specific service
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    /// Add an HTTP status code
    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Add a request ID
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Add an endpoint
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Add a context value
    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
    }

    /// Add a context value and return self (builder pattern)
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.add(key, value);
        self
    }
}

/// Failure classification handed to callers inside result objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input rejected before transmission
    Validation,
    /// The request (or the caller's deadline) timed out
    Timeout,
    /// The backend could not be reached
    Connect,
    /// The connection failed after it was established
    Network,
    /// The backend answered with a non-success status
    Http { status: u16 },
    /// No payload shape was accepted
    Negotiation,
    /// Rejected locally because the circuit breaker is open
    CircuitOpen,
    /// A response could not be understood
    Parsing,
    /// The client is misconfigured
    Configuration,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// A short, user-facing hint on what to do about this failure
    pub fn guidance(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => {
                "The request took too long. The service might be processing a complex query. Please try again."
            }
            ErrorKind::Connect => {
                "Unable to reach the service. Please check your connection and try again."
            }
            ErrorKind::Network => {
                "The connection to the service was interrupted. Please try again."
            }
            ErrorKind::Http { status } if *status >= 500 => {
                "The service is temporarily unavailable. Please try again in a moment."
            }
            ErrorKind::CircuitOpen => {
                "Service is recovering from repeated failures. Please wait a minute and try again."
            }
            ErrorKind::Validation => "Please check the details you entered and try again.",
            _ => "An unexpected error occurred. Please try rephrasing your question.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Connect => write!(f, "connect"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Http { status } => write!(f, "http_{}", status),
            ErrorKind::Negotiation => write!(f, "negotiation"),
            ErrorKind::CircuitOpen => write!(f, "circuit_open"),
            ErrorKind::Parsing => write!(f, "parsing"),
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// Structured error carried by failed results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryError {
    /// What went wrong
    pub kind: ErrorKind,

    /// Human-readable description
    pub message: String,
}

impl QueryError {
    /// Create a new query error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<&ServiceError> for QueryError {
    fn from(err: &ServiceError) -> Self {
        QueryError::new(err.kind(), err.root().to_string())
    }
}

/// Convert reqwest errors to ServiceError
impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        let mut context = ErrorContext::for_service("http_client");
        if let Some(url) = err.url() {
            context = context.endpoint(url.as_str());
        }

        // Connect timeouts report both flags; the timeout wins
        let service_error = if err.is_timeout() {
            ServiceError::timeout(format!("request timed out: {}", err))
        } else if err.is_connect() {
            ServiceError::connect(format!("backend unreachable: {}", err))
        } else if err.is_decode() {
            ServiceError::parsing(format!("Response decode error: {}", err))
        } else if err.is_builder() {
            ServiceError::configuration(format!("Invalid request: {}", err))
        } else {
            ServiceError::network(format!("HTTP client error: {}", err))
        };

        if let Some(status) = err.status() {
            service_error.with_context(context.status_code(status.as_u16()))
        } else {
            service_error.with_context(context)
        }
    }
}

/// Convert serde_json errors to ServiceError
impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::parsing(format!("JSON error: {}", err))
            .with_context(ErrorContext::for_service("json"))
    }
}
