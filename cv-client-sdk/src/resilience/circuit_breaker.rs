//! Circuit breaker for the CV backend
//!
//! Counts consecutive failures for one session. Once the threshold is
//! reached the circuit opens and calls are rejected locally until the reset
//! timeout has passed since the most recent failure. State is evaluated
//! lazily on every `allow()` call; there is no background timer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::CircuitBreakerStatus;

/// Message carried by every result rejected because of an open circuit
pub const CIRCUIT_OPEN_MESSAGE: &str =
    "Service temporarily unavailable - too many recent failures, please try again in a minute";

/// Source of the current time
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// The current instant
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// Time since the last failure before a trial request is allowed
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure: Option<Instant>,
    is_open: bool,
    total_failures: u64,
    total_successes: u64,
    times_opened: u64,
}

/// A thread-safe, per-session circuit breaker
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &*self.lock())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the specified configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a circuit breaker driven by a custom clock
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
            clock,
        }
    }

    /// Whether a call may go out right now.
    ///
    /// An open circuit whose reset timeout has elapsed is reset here and the
    /// call is allowed through as a trial.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();

        if !state.is_open {
            return true;
        }

        if self.timeout_elapsed(&state, now) {
            info!(
                failures = state.failure_count,
                "Circuit breaker reset timeout elapsed, allowing trial request"
            );
            state.failure_count = 0;
            state.is_open = false;
            true
        } else {
            debug!("Circuit breaker open, rejecting request");
            false
        }
    }

    /// Record a successful request
    pub fn record_success(&self) {
        let mut state = self.lock();
        state.total_successes += 1;
        if state.is_open || state.failure_count > 0 {
            debug!(previous_failures = state.failure_count, "Circuit breaker cleared by success");
        }
        state.failure_count = 0;
        state.is_open = false;
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut state = self.lock();

        state.failure_count += 1;
        state.total_failures += 1;
        state.last_failure = Some(now);

        if !state.is_open && state.failure_count >= self.config.failure_threshold {
            state.is_open = true;
            state.times_opened += 1;
            warn!(
                failures = state.failure_count,
                reset_timeout_secs = self.config.reset_timeout.as_secs(),
                "Circuit breaker transitioning to Open state"
            );
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.lock();
        state.failure_count = 0;
        state.last_failure = None;
        state.is_open = false;
    }

    /// Get the current circuit status without changing it
    pub fn status(&self) -> CircuitBreakerStatus {
        let now = self.clock.now();
        let state = self.lock();
        Self::status_of(&state, now, &self.config)
    }

    /// Current number of consecutive failures
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Time left until a trial request is allowed, if the circuit is open
    pub fn retry_after(&self) -> Option<Duration> {
        let now = self.clock.now();
        let state = self.lock();
        if !state.is_open {
            return None;
        }
        let last = state.last_failure?;
        Some(
            self.config
                .reset_timeout
                .saturating_sub(now.saturating_duration_since(last)),
        )
    }

    /// Point-in-time view of the breaker for diagnostics
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = self.clock.now();
        let state = self.lock();
        let retry_after_secs = if state.is_open {
            state.last_failure.map(|last| {
                self.config
                    .reset_timeout
                    .saturating_sub(now.saturating_duration_since(last))
                    .as_secs()
            })
        } else {
            None
        };

        CircuitBreakerSnapshot {
            status: Self::status_of(&state, now, &self.config),
            failure_count: state.failure_count,
            failure_threshold: self.config.failure_threshold,
            total_failures: state.total_failures,
            total_successes: state.total_successes,
            times_opened: state.times_opened,
            retry_after_secs,
        }
    }

    /// The configuration in use
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn status_of(state: &BreakerState, now: Instant, config: &CircuitBreakerConfig) -> CircuitBreakerStatus {
        if !state.is_open {
            CircuitBreakerStatus::Closed
        } else if state
            .last_failure
            .map_or(true, |last| now.saturating_duration_since(last) >= config.reset_timeout)
        {
            CircuitBreakerStatus::HalfOpen
        } else {
            CircuitBreakerStatus::Open
        }
    }

    fn timeout_elapsed(&self, state: &BreakerState, now: Instant) -> bool {
        match state.last_failure {
            Some(last) => now.saturating_duration_since(last) >= self.config.reset_timeout,
            None => true,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serializable view of a breaker's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerSnapshot {
    /// Current status
    pub status: CircuitBreakerStatus,

    /// Consecutive failures
    pub failure_count: u32,

    /// Failures needed to open
    pub failure_threshold: u32,

    /// Failures seen over the breaker's lifetime
    pub total_failures: u64,

    /// Successes seen over the breaker's lifetime
    pub total_successes: u64,

    /// How many times the circuit opened
    pub times_opened: u64,

    /// Seconds until a trial request is allowed, when open
    pub retry_after_secs: Option<u64>,
}
