//! CV backend data models
//!
//! Request payloads as they go on the wire and the result objects handed
//! back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::{QueryType, ResponseFormat};
use crate::error::QueryError;
use crate::resilience::CircuitBreakerSnapshot;

use super::normalize::NormalizedResponse;

/// Number of context chunks requested by the full payload
pub const DEFAULT_K: u32 = 3;

/// Language requested by the full payload
pub const DEFAULT_LANGUAGE: &str = "en";

/// Request body variants, from richest to smallest.
///
/// Deployments of the backend disagree on the accepted schema; a 422 for
/// one shape moves on to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    /// Question, conversation, classification and formatting fields
    Full,
    /// Question plus conversation fields
    Contextual,
    /// Only the question
    Minimal,
}

impl PayloadShape {
    /// All shapes in negotiation order
    pub const ALL: [PayloadShape; 3] = [PayloadShape::Full, PayloadShape::Contextual, PayloadShape::Minimal];

    /// This shape followed by every smaller one
    pub fn and_smaller(self) -> impl Iterator<Item = PayloadShape> {
        Self::ALL.into_iter().skip(self.index())
    }

    /// Negotiation order starting at this shape, wrapping around to the
    /// richer shapes last
    pub fn negotiation_order(self) -> impl Iterator<Item = PayloadShape> {
        self.and_smaller().chain(Self::ALL.into_iter().take(self.index()))
    }

    pub(crate) fn index(self) -> usize {
        match self {
            PayloadShape::Full => 0,
            PayloadShape::Contextual => 1,
            PayloadShape::Minimal => 2,
        }
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or(PayloadShape::Minimal)
    }
}

impl std::fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadShape::Full => write!(f, "full"),
            PayloadShape::Contextual => write!(f, "contextual"),
            PayloadShape::Minimal => write!(f, "minimal"),
        }
    }
}

/// A question bound to a session, before it is shaped for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub question: String,
    pub response_format: Option<ResponseFormat>,
    pub query_type: Option<QueryType>,
    pub session_id: String,
    pub conversation_id: String,
}

/// JSON body of `POST /query`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryPayload<'a> {
    pub question: &'a str,

    /// The backend keys conversation memory on this field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintain_context: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_sources: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<&'a str>,
}

impl<'a> QueryPayload<'a> {
    /// Shape a request for the wire
    pub fn for_shape(shape: PayloadShape, request: &'a QueryRequest) -> Self {
        let minimal = Self {
            question: &request.question,
            session_id: None,
            maintain_context: None,
            k: None,
            query_type: None,
            response_format: None,
            include_sources: None,
            language: None,
        };

        match shape {
            PayloadShape::Minimal => minimal,
            PayloadShape::Contextual => Self {
                session_id: Some(&request.conversation_id),
                maintain_context: Some(true),
                ..minimal
            },
            PayloadShape::Full => Self {
                session_id: Some(&request.conversation_id),
                maintain_context: Some(true),
                k: Some(DEFAULT_K),
                query_type: request.query_type,
                response_format: request.response_format,
                include_sources: Some(true),
                language: Some(DEFAULT_LANGUAGE),
                ..minimal
            },
        }
    }
}

/// Extra details reported alongside an answer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryMetadata {
    pub query_type: Option<String>,
    pub confidence_level: Option<String>,
    pub request_id: Option<String>,
    /// Session id echoed by the backend
    pub backend_session_id: Option<String>,
    /// Payload shape the backend accepted
    pub payload_shape: Option<PayloadShape>,
    /// Position of this query within the session
    pub message_number: Option<u64>,
}

/// Outcome of a query.
///
/// Either successful with content, or failed with an error; the two
/// constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    success: bool,
    content: String,
    error: Option<QueryError>,
    processing_time_ms: f64,
    confidence_score: Option<f64>,
    sources_count: Option<u64>,
    conversation_turn: Option<u64>,
    metadata: QueryMetadata,
}

impl QueryResult {
    /// A successful answer
    pub fn success(answer: NormalizedResponse, processing_time_ms: f64, metadata: QueryMetadata) -> Self {
        Self {
            success: true,
            content: answer.content,
            error: None,
            processing_time_ms,
            confidence_score: answer.confidence_score,
            sources_count: answer.sources_count,
            conversation_turn: answer.conversation_turn,
            metadata: QueryMetadata {
                query_type: answer.query_type.or(metadata.query_type),
                confidence_level: answer.confidence_level,
                request_id: answer.request_id.or(metadata.request_id),
                backend_session_id: answer.session_id,
                ..metadata
            },
        }
    }

    /// A failed query
    pub fn failure(error: QueryError, processing_time_ms: f64, metadata: QueryMetadata) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error),
            processing_time_ms,
            confidence_score: None,
            sources_count: None,
            conversation_turn: None,
            metadata,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Answer text; empty for failures
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    pub fn processing_time_ms(&self) -> f64 {
        self.processing_time_ms
    }

    pub fn confidence_score(&self) -> Option<f64> {
        self.confidence_score
    }

    pub fn sources_count(&self) -> Option<u64> {
        self.sources_count
    }

    pub fn conversation_turn(&self) -> Option<u64> {
        self.conversation_turn
    }

    pub fn metadata(&self) -> &QueryMetadata {
        &self.metadata
    }
}

/// JSON body of `POST /schedule-interview`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewRequest {
    #[serde(rename = "selected_day")]
    pub day: String,

    #[serde(rename = "selected_time")]
    pub time_slot: String,

    pub contact_info: String,
}

impl InterviewRequest {
    /// Build a request from raw form input, trimming every field
    pub fn new(day: &str, time_slot: &str, contact_info: &str) -> Self {
        Self {
            day: day.trim().to_string(),
            time_slot: time_slot.trim().to_string(),
            contact_info: contact_info.trim().to_string(),
        }
    }
}

/// Outcome of an interview scheduling request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterviewResult {
    success: bool,
    interview_id: Option<String>,
    message: String,
    error: Option<QueryError>,
    processing_time_ms: f64,
}

impl InterviewResult {
    /// A confirmed booking
    pub fn success(interview_id: String, message: String, processing_time_ms: f64) -> Self {
        Self {
            success: true,
            interview_id: Some(interview_id),
            message,
            error: None,
            processing_time_ms,
        }
    }

    /// A rejected or failed booking
    pub fn failure(error: QueryError, processing_time_ms: f64) -> Self {
        Self {
            success: false,
            interview_id: None,
            message: error.message.clone(),
            error: Some(error),
            processing_time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn interview_id(&self) -> Option<&str> {
        self.interview_id.as_deref()
    }

    /// Confirmation text, or the error message for failures
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    pub fn processing_time_ms(&self) -> f64 {
        self.processing_time_ms
    }
}

/// Backend answer to a scheduling request
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct InterviewResponse {
    #[serde(default)]
    pub interview_id: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Coarse health of the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Error,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Unhealthy => write!(f, "unhealthy"),
            HealthState::Error => write!(f, "error"),
        }
    }
}

/// Result of a health probe; always well formed
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub error: Option<String>,
    pub status_code: Option<u16>,
    pub latency_ms: f64,
    pub checked_at: DateTime<Utc>,
    /// Informational only; the probe neither reads nor changes it
    pub circuit: CircuitBreakerSnapshot,
    /// Endpoint discovery outcome, when discovery is enabled
    pub discovery: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> QueryRequest {
        QueryRequest {
            question: "What projects have you built?".to_string(),
            response_format: Some(ResponseFormat::BulletPoints),
            query_type: Some(QueryType::Projects),
            session_id: "s-1".to_string(),
            conversation_id: "s-1-abc".to_string(),
        }
    }

    #[test]
    fn test_payload_shapes() {
        let request = request();

        let full = serde_json::to_value(QueryPayload::for_shape(PayloadShape::Full, &request)).unwrap();
        assert_eq!(
            full,
            json!({
                "question": "What projects have you built?",
                "session_id": "s-1-abc",
                "maintain_context": true,
                "k": 3,
                "query_type": "projects",
                "response_format": "bullet_points",
                "include_sources": true,
                "language": "en"
            })
        );

        let contextual =
            serde_json::to_value(QueryPayload::for_shape(PayloadShape::Contextual, &request)).unwrap();
        assert_eq!(
            contextual,
            json!({
                "question": "What projects have you built?",
                "session_id": "s-1-abc",
                "maintain_context": true
            })
        );

        let minimal = serde_json::to_value(QueryPayload::for_shape(PayloadShape::Minimal, &request)).unwrap();
        assert_eq!(minimal, json!({ "question": "What projects have you built?" }));
    }

    #[test]
    fn test_shape_order() {
        let order: Vec<_> = PayloadShape::Contextual.and_smaller().collect();
        assert_eq!(order, vec![PayloadShape::Contextual, PayloadShape::Minimal]);
        assert_eq!(PayloadShape::Full.and_smaller().count(), 3);
        assert_eq!(PayloadShape::from_index(7), PayloadShape::Minimal);

        let wrapped: Vec<_> = PayloadShape::Minimal.negotiation_order().collect();
        assert_eq!(
            wrapped,
            vec![PayloadShape::Minimal, PayloadShape::Full, PayloadShape::Contextual]
        );
    }

    #[test]
    fn test_interview_request_wire_names() {
        let body = serde_json::to_value(InterviewRequest::new(" Monday ", "9:00-10:00", "a@b.com ")).unwrap();
        assert_eq!(
            body,
            json!({
                "selected_day": "Monday",
                "selected_time": "9:00-10:00",
                "contact_info": "a@b.com"
            })
        );
    }

    #[test]
    fn test_failure_carries_error_not_content() {
        let error = QueryError::new(crate::error::ErrorKind::Timeout, "timeout: slow");
        let result = QueryResult::failure(error.clone(), 12.0, QueryMetadata::default());
        assert!(!result.is_success());
        assert!(result.content().is_empty());
        assert_eq!(result.error(), Some(&error));

        let interview = InterviewResult::failure(error, 1.0);
        assert_eq!(interview.message(), "timeout: slow");
        assert!(interview.interview_id().is_none());
    }
}
