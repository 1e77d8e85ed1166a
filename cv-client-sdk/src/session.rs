//! Per-user session state
//!
//! A `SessionContext` is created by the caller for each logical user and
//! handed to the client that serves that user. It owns everything that must
//! never leak between users: the circuit breaker, the conversation id used
//! for multi-turn memory on the backend, and the request counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};

/// Identity and mutable state of one user session
#[derive(Debug)]
pub struct SessionContext {
    session_id: String,
    conversation_id: Mutex<String>,
    message_count: AtomicU64,
    last_request_time: Mutex<Option<DateTime<Utc>>>,
    created_at: DateTime<Utc>,
    breaker: CircuitBreaker,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Create a session with a fresh random id and the default breaker
    pub fn new() -> Self {
        Self::with_breaker(CircuitBreaker::default())
    }

    /// Create a session with a custom breaker configuration
    pub fn with_breaker_config(config: CircuitBreakerConfig) -> Self {
        Self::with_breaker(CircuitBreaker::new(config))
    }

    /// Create a session around an existing breaker
    pub fn with_breaker(breaker: CircuitBreaker) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), breaker)
    }

    /// Create a session with a caller-chosen id
    pub fn with_id(session_id: impl Into<String>, breaker: CircuitBreaker) -> Self {
        let session_id = session_id.into();
        Self {
            conversation_id: Mutex::new(session_id.clone()),
            session_id,
            message_count: AtomicU64::new(0),
            last_request_time: Mutex::new(None),
            created_at: Utc::now(),
            breaker,
        }
    }

    /// Stable id of this session
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Id used by the backend to correlate conversation turns
    pub fn conversation_id(&self) -> String {
        lock(&self.conversation_id).clone()
    }

    /// Start a new conversation, keeping the session and its failure history
    pub fn start_new_conversation(&self) -> String {
        let short = Uuid::new_v4().simple().to_string();
        let new_id = format!("{}-{}", self.session_id, &short[..8]);
        *lock(&self.conversation_id) = new_id.clone();
        info!(session_id = %self.session_id, conversation_id = %new_id, "Started new conversation");
        new_id
    }

    /// Number of queries that went out for this session
    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::SeqCst)
    }

    /// Time of the last request that went out for this session
    pub fn last_request_time(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_request_time)
    }

    /// When this session was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The circuit breaker shared by every operation of this session
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Record that a request is being sent; returns the new message count
    pub(crate) fn record_request(&self) -> u64 {
        *lock(&self.last_request_time) = Some(Utc::now());
        self.message_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Diagnostics view of the session
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            conversation_id: self.conversation_id(),
            message_count: self.message_count(),
            last_request_time: self.last_request_time(),
            created_at: self.created_at,
            circuit: self.breaker.snapshot(),
        }
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub conversation_id: String,
    pub message_count: u64,
    pub last_request_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub circuit: CircuitBreakerSnapshot,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
