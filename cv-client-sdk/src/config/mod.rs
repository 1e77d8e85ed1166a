//! Configuration management for the backend client
//!
//! This module provides utilities for loading and validating client
//! configuration, with support for environment variables.

use std::collections::HashMap;
use std::env;
use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ServiceError};
use crate::util::parse_duration;

/// Default production backend
pub const DEFAULT_BACKEND_URL: &str = "https://cvbrain-production.up.railway.app";

/// Longest health probe timeout we accept
pub const MAX_HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get an integer configuration value
    fn get_int(&self, key: &str) -> Result<i64> {
        self.get(key)
    }

    /// Get a duration; accepts "30", "30s", "1.5", "500ms", "5m"
    fn get_duration(&self, key: &str) -> Result<Duration> {
        let value = self.get_string(key)?;
        parse_duration(&value).ok_or_else(|| {
            ServiceError::configuration(format!("Invalid duration for key {}: {}", key, value))
        })
    }

    /// Get a comma separated list, skipping empty entries
    fn get_list(&self, key: &str) -> Result<Vec<String>> {
        let value = self.get_string(key)?;
        Ok(value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Get a typed configuration value by parsing from string
    fn get<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        <T as FromStr>::Err: std::fmt::Display,
    {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<T>()
            .map_err(|e| ServiceError::configuration(format!("Invalid value for key {}: {}", key, e)))
    }

    /// Get a string configuration value with a default
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get a typed value, falling back to a default when missing.
    ///
    /// A present but malformed value is an error rather than a silent default.
    fn get_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        <T as FromStr>::Err: std::fmt::Display,
    {
        match self.get_string(key) {
            Ok(_) => self.get(key),
            Err(_) => Ok(default),
        }
    }

    /// Get a duration, falling back to a default when missing
    fn get_duration_or(&self, key: &str, default: Duration) -> Result<Duration> {
        match self.get_string(key) {
            Ok(_) => self.get_duration(key),
            Err(_) => Ok(default),
        }
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,

    /// Optional namespace for variables
    namespace: Option<String>,
}

impl EnvConfigProvider {
    /// Create a new environment variable config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a prefix for environment variables
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set a namespace for environment variables
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Format a configuration key as an environment variable
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        if let Some(ref namespace) = self.namespace {
            env_key.push_str(namespace);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));

        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => {
                ServiceError::configuration(format!("Environment variable not set: {}", env_key))
            }
            env::VarError::NotUnicode(_) => ServiceError::configuration(format!(
                "Environment variable is not valid unicode: {}",
                env_key
            )),
        })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    /// Create a new empty memory config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory config provider with initial values
    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Set a configuration value
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::configuration(format!("Configuration key not found: {}", key)))
    }
}

/// A composite config provider that tries multiple providers in order
#[derive(Default)]
pub struct CompositeConfigProvider {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl CompositeConfigProvider {
    /// Create a new composite config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the end of the chain
    pub fn add_provider(&mut self, provider: impl ConfigProvider + 'static) {
        self.providers.push(Box::new(provider));
    }

    /// Builder-style `add_provider`
    pub fn with_provider(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.add_provider(provider);
        self
    }
}

impl ConfigProvider for CompositeConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.providers
            .iter()
            .find_map(|provider| provider.get_string(key).ok())
            .ok_or_else(|| {
                ServiceError::configuration(format!(
                    "Configuration key not found in any provider: {}",
                    key
                ))
            })
    }
}

/// Everything the backend client needs to know about its environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Primary base URL of the CV service
    pub base_url: String,

    /// Route for questions
    pub query_path: String,

    /// Liveness route
    pub health_path: String,

    /// Interview scheduling route
    pub schedule_path: String,

    /// Timeout for query and scheduling requests
    pub request_timeout: Duration,

    /// Timeout for health probes
    pub health_timeout: Duration,

    /// Timeout for endpoint discovery probes
    pub probe_timeout: Duration,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry; doubles afterwards
    pub retry_base_delay: Duration,

    /// Consecutive failures that open a session's circuit
    pub circuit_failure_threshold: u32,

    /// How long an open circuit rejects calls
    pub circuit_timeout: Duration,

    /// Extra base URLs probed by endpoint discovery
    pub candidate_urls: Vec<String>,

    /// Query routes probed by endpoint discovery
    pub candidate_paths: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            query_path: "/query".to_string(),
            health_path: "/health".to_string(),
            schedule_path: "/schedule-interview".to_string(),
            request_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(3),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            circuit_failure_threshold: 3,
            circuit_timeout: Duration::from_secs(60),
            candidate_urls: Vec::new(),
            candidate_paths: vec![
                "/query".to_string(),
                "/v1/query".to_string(),
                "/api/query".to_string(),
            ],
        }
    }
}

impl BackendConfig {
    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let defaults = Self::default();

        let candidate_paths = match provider.get_list("candidate_paths") {
            Ok(paths) if !paths.is_empty() => paths,
            _ => defaults.candidate_paths,
        };

        let config = Self {
            base_url: provider.get_string_or("backend_url", &defaults.base_url),
            query_path: provider.get_string_or("query_path", &defaults.query_path),
            health_path: provider.get_string_or("health_path", &defaults.health_path),
            schedule_path: provider.get_string_or("schedule_path", &defaults.schedule_path),
            request_timeout: provider.get_duration_or("api_timeout", defaults.request_timeout)?,
            health_timeout: provider.get_duration_or("health_timeout", defaults.health_timeout)?,
            probe_timeout: provider.get_duration_or("probe_timeout", defaults.probe_timeout)?,
            max_retries: provider.get_or("max_retries", defaults.max_retries)?,
            retry_base_delay: provider
                .get_duration_or("retry_base_delay", defaults.retry_base_delay)?,
            circuit_failure_threshold: provider
                .get_or("circuit_failure_threshold", defaults.circuit_failure_threshold)?,
            circuit_timeout: provider.get_duration_or("circuit_timeout", defaults.circuit_timeout)?,
            candidate_urls: provider.get_list("candidate_urls").unwrap_or_default(),
            candidate_paths,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from unprefixed environment variables
    /// (`BACKEND_URL`, `API_TIMEOUT`, `MAX_RETRIES`, ...)
    pub fn from_env() -> Result<Self> {
        Self::from_provider(&EnvConfigProvider::new())
    }

    /// Validate this configuration
    pub fn validate(&self) -> Result<()> {
        validate_base_url(&self.base_url)?;
        for candidate in &self.candidate_urls {
            validate_base_url(candidate)?;
        }

        for path in [&self.query_path, &self.health_path, &self.schedule_path]
            .into_iter()
            .chain(self.candidate_paths.iter())
        {
            if !path.starts_with('/') {
                return Err(ServiceError::configuration(format!(
                    "Route must start with '/': {}",
                    path
                )));
            }
        }

        if self.request_timeout.is_zero() || self.probe_timeout.is_zero() {
            return Err(ServiceError::configuration("Timeouts must be greater than zero"));
        }

        if self.health_timeout.is_zero() || self.health_timeout > MAX_HEALTH_TIMEOUT {
            return Err(ServiceError::configuration(format!(
                "Health timeout must be between 0 and {}s",
                MAX_HEALTH_TIMEOUT.as_secs()
            )));
        }

        if self.circuit_failure_threshold == 0 {
            return Err(ServiceError::configuration(
                "Circuit failure threshold must be at least 1",
            ));
        }

        Ok(())
    }

    /// Full URL of a route on the primary backend
    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

/// Join a base URL and a route without doubling or dropping slashes
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn validate_base_url(base_url: &str) -> Result<()> {
    let parsed = Url::parse(base_url).map_err(|e| {
        ServiceError::configuration(format!("Invalid backend URL {}: {}", base_url, e))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ServiceError::configuration(format!(
            "Unsupported URL scheme {} in {}",
            other, base_url
        ))),
    }
}
