//! Mock tests for interview scheduling

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::ErrorKind;
    use crate::resilience::{CircuitBreakerStatus, RetryConfig};
    use crate::services::cv_backend::BackendClient;
    use crate::session::SessionContext;

    fn create_test_client(mock_server: &MockServer, session: Arc<SessionContext>) -> BackendClient {
        BackendClient::builder()
            .base_url(mock_server.uri())
            .session(session)
            .retry_config(RetryConfig {
                max_retries: 1,
                initial_interval: Duration::from_millis(10),
                ..RetryConfig::default()
            })
            .build()
            .expect("Failed to build backend client")
    }

    #[tokio::test]
    async fn test_schedule_interview_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/schedule-interview"))
            .and(body_json(json!({
                "selected_day": "Monday, Jan 1",
                "selected_time": "9:00-10:00",
                "contact_info": "a@b.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "interview_id": "int-42",
                "message": "Interview booked"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server, Arc::new(SessionContext::new()));
        let result = client
            .schedule_interview("Monday, Jan 1", "9:00-10:00", " a@b.com ")
            .await;

        assert!(result.is_success());
        assert_eq!(result.interview_id(), Some("int-42"));
        assert_eq!(result.message(), "Interview booked");
        assert!(result.error().is_none());
    }

    #[tokio::test]
    async fn test_missing_fields_get_defaults() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/schedule-interview"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "interview_id": 7 })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server, Arc::new(SessionContext::new()));
        let result = client
            .schedule_interview("Tuesday", "14:00-15:00", "+52 81 1234 5678")
            .await;

        assert!(result.is_success());
        assert_eq!(result.interview_id(), Some("7"));
        assert!(!result.message().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_backend() {
        let mock_server = MockServer::start().await;
        let session = Arc::new(SessionContext::new());

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server, session.clone());

        let result = client.schedule_interview("Monday, Jan 1", "9:00-10:00", "short").await;
        let error = result.error().expect("validation should fail");
        assert!(!result.is_success());
        assert_eq!(error.kind, ErrorKind::Validation);
        assert!(error.message.contains("too short"));

        let result = client.schedule_interview("", "9:00-10:00", "a@b.com").await;
        assert!(result.error().unwrap().message.contains("day"));

        assert_eq!(session.breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_scheduling_failures_share_the_session_breaker() {
        let mock_server = MockServer::start().await;
        let session = Arc::new(SessionContext::new());

        Mock::given(method("POST"))
            .and(path("/schedule-interview"))
            .respond_with(ResponseTemplate::new(500).set_body_string("calendar down"))
            .expect(2)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server, session.clone());
        let result = client.schedule_interview("Monday", "9:00-10:00", "a@b.com").await;

        let error = result.error().expect("scheduling should fail");
        assert_eq!(error.kind, ErrorKind::Http { status: 500 });
        assert_eq!(result.message(), "HTTP 500: calendar down");
        assert_eq!(session.breaker().failure_count(), 1);

        session.breaker().record_failure();
        session.breaker().record_failure();
        assert_eq!(client.circuit_status(), CircuitBreakerStatus::Open);

        // no further request: the mock expects exactly two
        let rejected = client.schedule_interview("Monday", "9:00-10:00", "a@b.com").await;
        assert_eq!(rejected.error().unwrap().kind, ErrorKind::CircuitOpen);
    }
}
