//! Resilience patterns for the backend client
//!
//! This module provides:
//! - Retry with exponential backoff
//! - A per-session circuit breaker
//! - A facade that gates a retried operation behind a breaker

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, Clock, SystemClock,
    CIRCUIT_OPEN_MESSAGE,
};
pub use retry::{RetryConfig, RetryExecutor};

use std::future::Future;

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, ServiceError};

/// Composes the retry policy with a caller-supplied circuit breaker.
///
/// The breaker is not owned here: it belongs to the session, so every
/// operation type issued for that session shares one set of counters.
#[derive(Debug, Clone, Default)]
pub struct Resilience {
    retry: RetryExecutor,
}

impl Resilience {
    /// Create a new resilience facade
    pub fn new(retry_config: RetryConfig) -> Self {
        Self {
            retry: RetryExecutor::new(retry_config),
        }
    }

    /// Execute a fallible operation with the breaker check and retries.
    ///
    /// The breaker sees one outcome per logical call, after retries are
    /// exhausted. Failures that never touched the backend are not recorded.
    pub async fn execute<F, Fut, T>(&self, breaker: &CircuitBreaker, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !breaker.allow() {
            let err = ServiceError::circuit_broken(CIRCUIT_OPEN_MESSAGE);
            return Err(match breaker.retry_after() {
                Some(wait) => err.with_context_value("retry_after_secs", wait.as_secs()),
                None => err,
            });
        }

        match self.retry.execute(operation).await {
            Ok(value) => {
                breaker.record_success();
                Ok(value)
            }
            Err(err) => {
                if err.counts_toward_breaker() {
                    breaker.record_failure();
                } else {
                    debug!(error = %err, "Failure not recorded by circuit breaker");
                }
                Err(err)
            }
        }
    }

    /// The retry executor in use
    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Configure the retry executor
    pub fn configure_retry(&mut self, config: RetryConfig) {
        self.retry = RetryExecutor::new(config);
    }
}

/// Status of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerStatus {
    /// Circuit is closed, allowing requests
    Closed,

    /// Circuit is open, rejecting requests
    Open,

    /// Reset timeout has elapsed; the next request is a trial
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}
