//! # CV Client SDK
//!
//! A resilient, session-aware client for the CV knowledge service.
//!
//! This crate provides:
//!
//! - A typed client for questions, interview scheduling and health probes
//! - Per-session circuit breaking and exponential-backoff retries
//! - Request payload negotiation and response normalization
//! - Optional endpoint discovery across candidate hosts and routes
//! - Configuration management and logging setup
//!
//! ## Architecture
//!
//! - `SessionContext`: per-user state; owns the circuit breaker
//! - `BackendClient`: one per session, built with `ClientBuilder`
//! - `Resilience`: retry policy gated by a session's breaker
//! - `EndpointResolver`: probes and caches a working endpoint
//! - `ServiceError` / `QueryError`: internal and caller-facing errors
//!
//! ```no_run
//! use std::sync::Arc;
//! use cv_client_sdk::{BackendClient, SessionContext};
//!
//! # async fn run() -> cv_client_sdk::Result<()> {
//! let session = Arc::new(SessionContext::new());
//! let client = BackendClient::builder().session(session).build()?;
//!
//! let result = client.query("What programming languages do you know?").await;
//! if result.is_success() {
//!     println!("{}", result.content());
//! }
//! # Ok(())
//! # }
//! ```

// Re-export core modules
pub mod core;
pub use self::core::{ClientBuilder, ServiceClient};

// Re-export service-specific modules
pub mod services;
pub use services::cv_backend::{
    BackendClient, HealthState, HealthStatus, InterviewResult, PayloadShape, QueryMetadata,
    QueryResult,
};
pub use services::discovery::{EndpointResolver, Resolution, ResolvedEndpoint};

// Re-export error handling
pub mod error;
pub use error::{ErrorContext, ErrorKind, QueryError, Result, ServiceError};

// Re-export resilience patterns
pub mod resilience;
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, Resilience, RetryConfig,
    RetryExecutor,
};

// Re-export configuration management
pub mod config;
pub use config::{BackendConfig, ConfigProvider, ConfigProviderExt};

pub mod classifier;
pub use classifier::{classify_query, ConfidenceBand, QueryType, ResponseFormat};

pub mod session;
pub use session::{SessionContext, SessionSnapshot};

pub mod validation;
pub use validation::{validate_interview_data, InterviewValidation};

pub mod logging;
pub use logging::{init_logging, LoggingConfig};

// Utility module for common functionality
pub mod util;

#[cfg(test)]
mod tests;

/// Create a new default client builder
pub fn client() -> ClientBuilder {
    ClientBuilder::new()
}
