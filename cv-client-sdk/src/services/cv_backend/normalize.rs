//! Response normalization
//!
//! The backend's answer field has changed name between deployments, so the
//! content is looked up in a fixed priority list before falling back to the
//! whole payload.

use serde_json::{Map, Value};

use crate::error::{Result, ServiceError};

/// Fields searched for answer content, in priority order
pub const CONTENT_FIELDS: &[&str] = &["answer", "response", "result"];

/// A backend answer reduced to the fields the client reports
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedResponse {
    pub content: String,
    pub confidence_score: Option<f64>,
    pub sources_count: Option<u64>,
    pub conversation_turn: Option<u64>,
    pub query_type: Option<String>,
    pub confidence_level: Option<String>,
    pub request_id: Option<String>,
    pub session_id: Option<String>,
}

/// Normalize a raw response body.
///
/// Non-JSON bodies are taken verbatim as the answer. An empty body is a
/// parsing error.
pub fn normalize_body(body: &str) -> Result<NormalizedResponse> {
    if body.trim().is_empty() {
        return Err(ServiceError::parsing("Empty response body"));
    }

    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(normalize_value(&value)),
        Err(_) => Ok(NormalizedResponse {
            content: body.to_string(),
            ..NormalizedResponse::default()
        }),
    }
}

/// Normalize an already parsed payload
pub fn normalize_value(value: &Value) -> NormalizedResponse {
    let content = extract_content(value);

    let Some(fields) = value.as_object() else {
        return NormalizedResponse {
            content,
            ..NormalizedResponse::default()
        };
    };

    NormalizedResponse {
        content,
        confidence_score: fields
            .get("confidence_score")
            .and_then(Value::as_f64)
            .map(|score| score.clamp(0.0, 1.0)),
        sources_count: sources_count(fields),
        conversation_turn: fields.get("conversation_turn").and_then(Value::as_u64),
        query_type: string_field(fields, "query_type"),
        confidence_level: string_field(fields, "confidence_level"),
        request_id: string_field(fields, "request_id"),
        session_id: string_field(fields, "session_id"),
    }
}

/// First non-empty content field, or the whole payload as text.
///
/// A bare JSON string is its own content.
pub fn extract_content(value: &Value) -> String {
    let found = value.as_object().and_then(|fields| {
        CONTENT_FIELDS
            .iter()
            .filter_map(|name| fields.get(*name))
            .find(|candidate| !is_blank(candidate))
    });

    match found {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        },
    }
}

// null, whitespace-only strings and empty containers carry no answer
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

// `relevant_chunks` is either a count or the list of chunks itself
fn sources_count(fields: &Map<String, Value>) -> Option<u64> {
    match fields.get("relevant_chunks")? {
        Value::Number(n) => n.as_u64(),
        Value::Array(chunks) => Some(chunks.len() as u64),
        _ => None,
    }
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_answer_field_wins() {
        let value = json!({ "result": "third", "response": "second", "answer": "first" });
        assert_eq!(extract_content(&value), "first");
    }

    #[test]
    fn test_response_field_used_when_no_answer() {
        let normalized = normalize_body(r#"{"response": "I know Rust", "confidence_score": 0.82}"#).unwrap();
        assert_eq!(normalized.content, "I know Rust");
        assert_eq!(normalized.confidence_score, Some(0.82));
    }

    #[test]
    fn test_null_field_is_skipped() {
        let value = json!({ "answer": null, "result": "fallback" });
        assert_eq!(extract_content(&value), "fallback");
    }

    #[test]
    fn test_empty_fields_fall_through() {
        let value = json!({ "answer": "", "response": "real content" });
        assert_eq!(extract_content(&value), "real content");

        let value = json!({ "answer": "   ", "response": [], "result": { "text": "nested" } });
        assert_eq!(extract_content(&value), r#"{"text":"nested"}"#);

        let value = json!({ "answer": "", "response": {}, "confidence_score": 0.4 });
        let content = extract_content(&value);
        assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), value);
    }

    #[test]
    fn test_whole_payload_when_no_known_field() {
        let value = json!({ "data": { "text": "hi" }, "status": "ok" });
        let content = extract_content(&value);
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_non_string_content_is_stringified() {
        let value = json!({ "answer": ["a", "b"] });
        assert_eq!(extract_content(&value), r#"["a","b"]"#);
    }

    #[test]
    fn test_metadata_extraction() {
        let body = json!({
            "answer": "Three years of Python",
            "confidence_score": 1.7,
            "relevant_chunks": [{ "id": 1 }, { "id": 2 }],
            "conversation_turn": 4,
            "query_type": "experience",
            "confidence_level": "high",
            "request_id": "req-9",
            "session_id": "abc"
        })
        .to_string();

        let normalized = normalize_body(&body).unwrap();
        assert_eq!(normalized.confidence_score, Some(1.0));
        assert_eq!(normalized.sources_count, Some(2));
        assert_eq!(normalized.conversation_turn, Some(4));
        assert_eq!(normalized.query_type.as_deref(), Some("experience"));
        assert_eq!(normalized.confidence_level.as_deref(), Some("high"));
        assert_eq!(normalized.request_id.as_deref(), Some("req-9"));
        assert_eq!(normalized.session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_plain_text_and_empty_bodies() {
        assert_eq!(normalize_body("just text").unwrap().content, "just text");
        assert_eq!(normalize_body(r#""quoted""#).unwrap().content, "quoted");
        assert!(normalize_body("   ").is_err());
    }
}
