//! HTTP status mapping
//!
//! Converts non-success responses from the CV backend into `ServiceError`
//! values and decides which statuses are worth retrying.

use reqwest::StatusCode;

use super::{ErrorContext, ServiceError};
use crate::util::truncate_string;

/// Maximum number of body characters kept in an HTTP error message
pub const MAX_ERROR_EXCERPT: usize = 200;

/// Map a non-success HTTP response to a ServiceError
pub fn map_http_error(status: StatusCode, body: &str, context: &mut ErrorContext) -> ServiceError {
    context.status_code = Some(status.as_u16());
    context.add("category", classify_http_error(status));

    let excerpt = body_excerpt(body);
    ServiceError::http(status.as_u16(), excerpt)
}

/// Trimmed, length-capped excerpt of a response body
pub fn body_excerpt(body: &str) -> String {
    truncate_string(body.trim(), MAX_ERROR_EXCERPT)
}

/// Helper function to classify HTTP errors by category
pub fn classify_http_error(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "validation",
        404 => "not_found",
        405 => "method_not_allowed",
        408 => "timeout",
        422 => "payload_rejected",
        429 => "rate_limit",
        401 | 403 => "unauthorized",
        500..=599 => "server",
        _ => "unknown",
    }
}

/// Determine if an HTTP status code indicates a retryable error
pub fn is_retryable_status(status: StatusCode) -> bool {
    is_retryable_code(status.as_u16())
}

/// Same as `is_retryable_status`, for raw status codes
pub fn is_retryable_code(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

/// Whether the backend rejected the payload shape rather than the request
pub fn is_payload_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNPROCESSABLE_ENTITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_http_error_truncates_body() {
        let body = "x".repeat(500);
        let mut context = ErrorContext::new();
        let err = map_http_error(StatusCode::INTERNAL_SERVER_ERROR, &body, &mut context);

        match err {
            ServiceError::Http { status, body } => {
                assert_eq!(status, 500);
                assert!(body.chars().count() <= MAX_ERROR_EXCERPT);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(context.status_code, Some(500));
        assert_eq!(context.data.get("category").map(String::as_str), Some("server"));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::UNPROCESSABLE_ENTITY));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_payload_rejection() {
        assert!(is_payload_rejection(StatusCode::UNPROCESSABLE_ENTITY));
        assert!(!is_payload_rejection(StatusCode::BAD_REQUEST));
        assert_eq!(classify_http_error(StatusCode::UNPROCESSABLE_ENTITY), "payload_rejected");
    }
}
