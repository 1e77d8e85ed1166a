//! Client builder implementation
//!
//! Provides the builder used to create and configure backend clients.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as ReqwestClient;
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::{Result, ServiceError};
use crate::resilience::{CircuitBreakerConfig, Resilience, RetryConfig};
use crate::services::common::{build_http_client, UserAgent};
use crate::services::cv_backend::BackendClient;
use crate::services::discovery::EndpointResolver;
use crate::session::SessionContext;

/// Builder for `BackendClient`
pub struct ClientBuilder {
    /// Base configuration; defaults when not set
    config: Option<BackendConfig>,

    /// Base URL override
    base_url: Option<String>,

    /// Session served by the client
    session: Option<Arc<SessionContext>>,

    /// Pre-built HTTP client whose connection pool is shared
    http_client: Option<ReqwestClient>,

    /// Custom headers to include with all requests
    custom_headers: HashMap<String, String>,

    /// Request timeout override
    timeout: Option<Duration>,

    /// Retry configuration override
    retry_config: Option<RetryConfig>,

    /// User agent
    user_agent: UserAgent,

    /// Enable endpoint discovery
    discovery: bool,

    /// Enable response compression
    compression: bool,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            config: None,
            base_url: None,
            session: None,
            http_client: None,
            custom_headers: HashMap::new(),
            timeout: None,
            retry_config: None,
            user_agent: UserAgent::default(),
            discovery: false,
            compression: true,
        }
    }
}

impl ClientBuilder {
    /// Create a new client builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a complete configuration
    pub fn config(mut self, config: BackendConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the base URL for the service
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Bind the client to a session
    pub fn session(mut self, session: Arc<SessionContext>) -> Self {
        self.session = Some(session);
        self
    }

    /// Reuse an HTTP client (and its connection pool).
    ///
    /// Timeout, user agent and custom headers are then the caller's concern.
    pub fn http_client(mut self, client: ReqwestClient) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Add a custom header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(key.into(), value.into());
        self
    }

    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Configure retry behavior
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, user_agent: UserAgent) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Enable or disable endpoint discovery
    pub fn discovery(mut self, enabled: bool) -> Self {
        self.discovery = enabled;
        self
    }

    /// Enable or disable compression
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Build the backend client.
    ///
    /// Without an explicit session a fresh one is created with a breaker
    /// tuned from the configuration.
    pub fn build(self) -> Result<BackendClient> {
        let mut config = self.config.unwrap_or_default();
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout = timeout;
        }
        config.validate()?;

        let http = match self.http_client {
            Some(client) => client,
            None => build_http_client(
                &self.user_agent,
                config.request_timeout,
                self.compression,
                header_map(&self.custom_headers)?,
            )?,
        };

        let session = self.session.unwrap_or_else(|| {
            Arc::new(SessionContext::with_breaker_config(CircuitBreakerConfig {
                failure_threshold: config.circuit_failure_threshold,
                reset_timeout: config.circuit_timeout,
            }))
        });

        let retry_config = self.retry_config.unwrap_or_else(|| RetryConfig {
            max_retries: config.max_retries,
            initial_interval: config.retry_base_delay,
            ..RetryConfig::default()
        });

        let resolver = if self.discovery {
            Some(EndpointResolver::new(http.clone(), &config))
        } else {
            None
        };

        debug!(
            base_url = %config.base_url,
            session_id = %session.session_id(),
            discovery = self.discovery,
            "Built backend client"
        );

        Ok(BackendClient::from_parts(
            http,
            config,
            session,
            Resilience::new(retry_config),
            resolver,
        ))
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let header_name = HeaderName::from_str(key)
            .map_err(|e| ServiceError::configuration(format!("Invalid header name: {}", e)))?;

        let header_value = HeaderValue::from_str(value)
            .map_err(|e| ServiceError::configuration(format!("Invalid header value: {}", e)))?;

        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_defaults() {
        let client = ClientBuilder::new().build().unwrap();
        assert_eq!(client.config().base_url, crate::config::DEFAULT_BACKEND_URL);
        assert_eq!(client.session().breaker().config().failure_threshold, 3);
    }

    #[test]
    fn test_explicit_session_is_used() {
        let session = Arc::new(SessionContext::new());
        let client = ClientBuilder::new()
            .base_url("http://localhost:9000")
            .session(session.clone())
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(client.session(), &session));
        assert_eq!(client.config().base_url, "http://localhost:9000");
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(ClientBuilder::new().base_url("not a url").build().is_err());
        assert!(ClientBuilder::new().header("bad header", "x").build().is_err());
        assert!(ClientBuilder::new().timeout(Duration::ZERO).build().is_err());
    }
}
