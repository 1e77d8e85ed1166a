//! CV backend client implementation
//!
//! This module provides the session-bound client for the CV knowledge
//! service: questions, interview scheduling and health probes. Every public
//! operation returns a well-formed result object; failures never escape as
//! `Err` or panics.

mod models;
pub mod normalize;

pub use models::*;
pub use normalize::{extract_content, normalize_body, NormalizedResponse, CONTENT_FIELDS};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::classifier::{classify_query, ResponseFormat};
use crate::config::{join_url, BackendConfig};
use crate::core::{ClientBuilder, ServiceClient};
use crate::error::mapping::{body_excerpt, is_payload_rejection, map_http_error};
use crate::error::{ErrorKind, QueryError, Result, ServiceError};
use crate::resilience::{CircuitBreakerStatus, Resilience};
use crate::services::common::{create_error_context, read_body, read_error_body, session_headers};
use crate::services::discovery::{EndpointResolver, Resolution, ResolvedEndpoint};
use crate::session::SessionContext;
use crate::util::{generate_request_id, measure_time_async, millis, sanitize_for_logging, truncate_string};
use crate::validation::validate_interview_data;

/// Client for one user session of the CV backend
#[derive(Debug)]
pub struct BackendClient {
    /// HTTP client; its connection pool may be shared with other sessions
    http: Client,

    /// Configuration
    config: BackendConfig,

    /// Session state, including the circuit breaker
    session: Arc<SessionContext>,

    /// Retry policy gated by the session breaker
    resilience: Resilience,

    /// Endpoint discovery, when enabled
    resolver: Option<EndpointResolver>,

    /// Index of the last payload shape the backend accepted
    preferred_shape: AtomicUsize,
}

impl BackendClient {
    /// Create a new builder for the backend client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(
        http: Client,
        config: BackendConfig,
        session: Arc<SessionContext>,
        resilience: Resilience,
        resolver: Option<EndpointResolver>,
    ) -> Self {
        Self {
            http,
            config,
            session,
            resilience,
            resolver,
            preferred_shape: AtomicUsize::new(PayloadShape::Full.index()),
        }
    }

    /// Ask a question with the default response format
    pub async fn query(&self, question: &str) -> QueryResult {
        self.query_with_format(question, None).await
    }

    /// Ask a question, optionally requesting a response format
    pub async fn query_with_format(&self, question: &str, format: Option<ResponseFormat>) -> QueryResult {
        self.query_traced(question, format, &generate_request_id(), &OnceLock::new())
            .await
    }

    async fn query_traced(
        &self,
        question: &str,
        format: Option<ResponseFormat>,
        request_id: &str,
        message_number: &OnceLock<u64>,
    ) -> QueryResult {
        let query_type = classify_query(question);

        debug!(
            session_id = %self.session.session_id(),
            request_id = %request_id,
            query_type = %query_type,
            question = %truncate_string(&sanitize_for_logging(question), 80),
            "Sending query"
        );

        let (outcome, elapsed) = measure_time_async(|| {
            self.run_query(question, format, request_id, message_number)
        })
        .await;

        let metadata = QueryMetadata {
            query_type: Some(query_type.to_string()),
            request_id: Some(request_id.to_string()),
            message_number: message_number.get().copied(),
            ..QueryMetadata::default()
        };

        match outcome {
            Ok((answer, shape)) => {
                info!(
                    session_id = %self.session.session_id(),
                    request_id = %request_id,
                    shape = %shape,
                    elapsed_ms = millis(elapsed),
                    "Query answered"
                );
                QueryResult::success(
                    answer,
                    millis(elapsed),
                    QueryMetadata {
                        payload_shape: Some(shape),
                        ..metadata
                    },
                )
            }
            Err(err) => {
                warn!(
                    session_id = %self.session.session_id(),
                    request_id = %request_id,
                    kind = %err.kind(),
                    "Query failed: {}",
                    err
                );
                QueryResult::failure(QueryError::from(&err), millis(elapsed), metadata)
            }
        }
    }

    /// Ask a question under a caller deadline covering retries and backoff.
    ///
    /// The in-flight request is dropped when the deadline expires.
    pub async fn query_with_deadline(
        &self,
        question: &str,
        format: Option<ResponseFormat>,
        deadline: Duration,
    ) -> QueryResult {
        let request_id = generate_request_id();
        let message_number = OnceLock::new();

        let traced = self.query_traced(question, format, &request_id, &message_number);
        match tokio::time::timeout(deadline, traced).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    session_id = %self.session.session_id(),
                    request_id = %request_id,
                    deadline_ms = millis(deadline),
                    "Query abandoned at caller deadline"
                );
                let err = ServiceError::timeout(format!("caller deadline of {:?} exceeded", deadline));
                let metadata = QueryMetadata {
                    query_type: Some(classify_query(question).to_string()),
                    request_id: Some(request_id.clone()),
                    message_number: message_number.get().copied(),
                    ..QueryMetadata::default()
                };
                QueryResult::failure(QueryError::from(&err), millis(deadline), metadata)
            }
        }
    }

    /// Request an interview slot.
    ///
    /// Input is validated before anything is sent; the request shares the
    /// session breaker and retry policy with queries.
    pub async fn schedule_interview(&self, day: &str, time_slot: &str, contact_info: &str) -> InterviewResult {
        let validation = validate_interview_data(day, time_slot, contact_info);
        if !validation.is_valid {
            debug!(session_id = %self.session.session_id(), "Interview request rejected: {}", validation.message);
            return InterviewResult::failure(QueryError::new(ErrorKind::Validation, validation.message), 0.0);
        }

        let request = InterviewRequest::new(day, time_slot, contact_info);
        let request_id = generate_request_id();

        info!(
            session_id = %self.session.session_id(),
            request_id = %request_id,
            day = %request.day,
            time_slot = %request.time_slot,
            contact = %sanitize_for_logging(&request.contact_info),
            "Scheduling interview"
        );

        let (outcome, elapsed) = measure_time_async(|| {
            let request = &request;
            let request_id = request_id.as_str();
            self.resilience.execute(self.session.breaker(), move || async move {
                let base_url = self.endpoint().await.base_url;
                let url = join_url(&base_url, &self.config.schedule_path);
                self.send_interview(request, &url, request_id).await
            })
        })
        .await;

        match outcome {
            Ok(response) => {
                let interview_id = match response.interview_id {
                    Some(serde_json::Value::String(id)) => id,
                    Some(serde_json::Value::Null) | None => request_id.clone(),
                    Some(other) => other.to_string(),
                };
                let message = response
                    .message
                    .unwrap_or_else(|| "Interview request received".to_string());

                info!(interview_id = %interview_id, "Interview scheduled");
                InterviewResult::success(interview_id, message, millis(elapsed))
            }
            Err(err) => {
                warn!(request_id = %request_id, kind = %err.kind(), "Interview scheduling failed: {}", err);
                InterviewResult::failure(QueryError::from(&err), millis(elapsed))
            }
        }
    }

    /// Probe the backend's health route.
    ///
    /// Bypasses the circuit breaker entirely, so an open circuit never hides
    /// a recovered backend.
    pub async fn get_health_status(&self) -> HealthStatus {
        let base_url = self
            .resolver
            .as_ref()
            .and_then(EndpointResolver::cached)
            .map(|resolution| resolution.endpoint().base_url.clone())
            .unwrap_or_else(|| self.config.base_url.clone());
        let url = join_url(&base_url, &self.config.health_path);
        let request_id = generate_request_id();

        let (outcome, latency) = measure_time_async(|| {
            self.http
                .get(&url)
                .headers(session_headers(&self.session, &request_id))
                .timeout(self.config.health_timeout)
                .send()
        })
        .await;

        let (status, error, status_code) = match outcome {
            Ok(response) if response.status() == StatusCode::OK => (HealthState::Healthy, None, Some(200)),
            Ok(response) => {
                let code = response.status().as_u16();
                let body = read_error_body(response).await;
                let err = ServiceError::http(code, body_excerpt(&body));
                (HealthState::Unhealthy, Some(err.to_string()), Some(code))
            }
            Err(e) => {
                let err = ServiceError::from(e);
                let state = match err.kind() {
                    ErrorKind::Configuration | ErrorKind::Internal => HealthState::Error,
                    _ => HealthState::Unhealthy,
                };
                (state, Some(err.to_string()), None)
            }
        };

        debug!(url = %url, status = %status, latency_ms = millis(latency), "Health probe finished");

        HealthStatus {
            status,
            error,
            status_code,
            latency_ms: millis(latency),
            checked_at: Utc::now(),
            circuit: self.session.breaker().snapshot(),
            discovery: self
                .resolver
                .as_ref()
                .and_then(EndpointResolver::cached)
                .map(|resolution| resolution.describe()),
        }
    }

    /// Clear the backend's conversation memory for this session.
    ///
    /// The session id and its failure history are kept.
    pub fn start_new_conversation(&self) -> String {
        self.session.start_new_conversation()
    }

    /// The session this client serves
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// State of the session's circuit breaker
    pub fn circuit_status(&self) -> CircuitBreakerStatus {
        self.session.breaker().status()
    }

    /// Configuration in use
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Payload shape the next query starts with
    pub fn preferred_shape(&self) -> PayloadShape {
        PayloadShape::from_index(self.preferred_shape.load(Ordering::SeqCst))
    }

    /// Probe candidate endpoints again; `None` when discovery is disabled
    pub async fn rediscover_endpoint(&self) -> Option<Resolution> {
        match &self.resolver {
            Some(resolver) => Some(resolver.rediscover().await),
            None => None,
        }
    }

    async fn endpoint(&self) -> ResolvedEndpoint {
        match &self.resolver {
            Some(resolver) => resolver.resolve().await.endpoint().clone(),
            None => ResolvedEndpoint {
                base_url: self.config.base_url.clone(),
                path: self.config.query_path.clone(),
            },
        }
    }

    async fn run_query(
        &self,
        question: &str,
        format: Option<ResponseFormat>,
        request_id: &str,
        message_number: &OnceLock<u64>,
    ) -> Result<(NormalizedResponse, PayloadShape)> {
        let request = QueryRequest {
            question: question.to_string(),
            response_format: format,
            query_type: Some(classify_query(question)),
            session_id: self.session.session_id().to_string(),
            conversation_id: self.session.conversation_id(),
        };

        // Resolved inside the operation so an open circuit never probes
        let request = &request;
        let result = self
            .resilience
            .execute(self.session.breaker(), move || async move {
                let url = self.endpoint().await.url();
                self.send_query(request, &url, request_id, message_number).await
            })
            .await;

        // A missing route usually means the cached endpoint went stale
        if let (Err(err), Some(resolver)) = (&result, &self.resolver) {
            if err.status_code() == Some(404) {
                resolver.invalidate().await;
            }
        }

        result
    }

    // One attempt: every payload shape is tried in negotiation order until
    // one is accepted. A 422 moves on to the next shape.
    async fn send_query(
        &self,
        request: &QueryRequest,
        url: &str,
        request_id: &str,
        message_number: &OnceLock<u64>,
    ) -> Result<(NormalizedResponse, PayloadShape)> {
        message_number.get_or_init(|| self.session.record_request());

        let mut rejected = Vec::new();
        for shape in self.preferred_shape().negotiation_order() {
            let payload = QueryPayload::for_shape(shape, request);

            let response = self
                .http
                .post(url)
                .headers(session_headers(&self.session, request_id))
                .timeout(self.config.request_timeout)
                .json(&payload)
                .send()
                .await?;

            let status = response.status();

            if is_payload_rejection(status) {
                let body = read_error_body(response).await;
                debug!(request_id = %request_id, shape = %shape, "Payload shape rejected");
                rejected.push(format!("{}: {}", shape, body_excerpt(&body)));
                continue;
            }

            if !status.is_success() {
                let body = read_error_body(response).await;
                let mut context = create_error_context(url, request_id, &self.session);
                let error = map_http_error(status, &body, &mut context);
                return Err(error.with_context(context));
            }

            let body = read_body(response)
                .await
                .map_err(|e| e.with_context(create_error_context(url, request_id, &self.session)))?;

            if shape != self.preferred_shape() {
                info!(shape = %shape, "Backend accepted a different payload shape");
                self.preferred_shape.store(shape.index(), Ordering::SeqCst);
            }

            return Ok((normalize_body(&body)?, shape));
        }

        Err(ServiceError::negotiation(format!(
            "every payload shape was rejected ({})",
            rejected.join("; ")
        ))
        .with_context(create_error_context(url, request_id, &self.session)))
    }

    async fn send_interview(
        &self,
        request: &InterviewRequest,
        url: &str,
        request_id: &str,
    ) -> Result<InterviewResponse> {
        let response = self
            .http
            .post(url)
            .headers(session_headers(&self.session, request_id))
            .timeout(self.config.request_timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = read_error_body(response).await;
            let mut context = create_error_context(url, request_id, &self.session);
            let error = map_http_error(status, &body, &mut context);
            return Err(error.with_context(context));
        }

        let body = read_body(response)
            .await
            .map_err(|e| e.with_context(create_error_context(url, request_id, &self.session)))?;

        if body.trim().is_empty() {
            return Ok(InterviewResponse::default());
        }

        match serde_json::from_str(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                warn!(request_id = %request_id, "Unreadable scheduling confirmation: {}", e);
                Ok(InterviewResponse::default())
            }
        }
    }
}

#[async_trait]
impl ServiceClient for BackendClient {
    fn name(&self) -> &str {
        "cv-backend"
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.get_health_status().await.is_healthy())
    }
}
