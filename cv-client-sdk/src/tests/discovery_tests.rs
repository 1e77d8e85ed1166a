//! Mock tests for endpoint discovery

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::BackendConfig;
    use crate::error::ErrorKind;
    use crate::resilience::RetryConfig;
    use crate::services::cv_backend::BackendClient;
    use crate::services::discovery::{EndpointResolver, Resolution, ResolvedEndpoint};
    use crate::session::SessionContext;

    fn test_config(base_url: &str) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            probe_timeout: Duration::from_millis(500),
            ..BackendConfig::default()
        }
    }

    fn resolver_for(base_url: &str) -> EndpointResolver {
        EndpointResolver::new(Client::new(), &test_config(base_url))
    }

    #[tokio::test]
    async fn test_method_not_allowed_counts_as_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/v1/query"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server.uri());
        let resolution = resolver.resolve().await;

        assert_eq!(
            resolution,
            Resolution::Resolved(ResolvedEndpoint {
                base_url: mock_server.uri(),
                path: "/v1/query".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_get_fallback_when_head_not_implemented() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(501))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(405))
            .expect(1)
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server.uri());
        let resolution = resolver.resolve().await;

        assert!(!resolution.is_fallback());
        assert_eq!(resolution.endpoint().path, "/query");
    }

    #[tokio::test]
    async fn test_fallback_is_reported() {
        let config = test_config("http://127.0.0.1:1");
        let resolver = EndpointResolver::new(Client::new(), &config);

        let resolution = resolver.resolve().await;

        assert!(resolution.is_fallback());
        assert_eq!(resolution.endpoint(), resolver.default_endpoint());
        assert!(resolution.describe().starts_with("fallback: http://127.0.0.1:1/query"));
        assert!(resolution.describe().contains("0 reachable"));
    }

    #[tokio::test]
    async fn test_resolution_is_cached_until_invalidated() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server.uri());
        let first = resolver.resolve().await;
        let second = resolver.resolve().await;
        assert_eq!(first, second);
        assert_eq!(resolver.cached(), Some(first));

        resolver.invalidate().await;
        assert!(resolver.cached().is_none());

        // probes again: second expected HEAD
        assert!(!resolver.resolve().await.is_fallback());
    }

    #[tokio::test]
    async fn test_discover_with_explicit_candidates() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/api/ask"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let resolver = resolver_for("https://cvbrain-production.up.railway.app");
        let resolution = resolver
            .discover(
                &[mock_server.uri()],
                &["/query".to_string(), "/api/ask".to_string()],
            )
            .await;

        assert_eq!(resolution.endpoint().url(), format!("{}/api/ask", mock_server.uri()));
        // `discover` never fills the cache
        assert!(resolver.cached().is_none());
    }

    #[tokio::test]
    async fn test_client_uses_discovered_route() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/v1/query"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": "via v1" })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = BackendClient::builder()
            .config(test_config(&mock_server.uri()))
            .session(Arc::new(SessionContext::new()))
            .discovery(true)
            .build()
            .unwrap();

        let result = client.query("hello").await;
        assert_eq!(result.content(), "via v1");

        let health = client.get_health_status().await;
        assert!(health.is_healthy());
        assert_eq!(
            health.discovery,
            Some(format!("resolved: {}/v1/query", mock_server.uri()))
        );
    }

    #[tokio::test]
    async fn test_not_found_invalidates_cached_endpoint() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = BackendClient::builder()
            .config(test_config(&mock_server.uri()))
            .retry_config(RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            })
            .discovery(true)
            .build()
            .unwrap();

        assert!(!client.query("hello").await.is_success());
        assert!(client.get_health_status().await.discovery.is_none());

        let rediscovered = client.rediscover_endpoint().await.expect("discovery is enabled");
        assert!(!rediscovered.is_fallback());
        assert!(client.get_health_status().await.discovery.is_some());
    }

    #[tokio::test]
    async fn test_open_circuit_sends_nothing_even_before_discovery() {
        let mock_server = MockServer::start().await;
        let session = Arc::new(SessionContext::new());
        for _ in 0..3 {
            session.breaker().record_failure();
        }

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = BackendClient::builder()
            .config(test_config(&mock_server.uri()))
            .session(session.clone())
            .discovery(true)
            .build()
            .unwrap();

        let result = client.query("hello").await;
        assert_eq!(result.error().unwrap().kind, ErrorKind::CircuitOpen);

        let interview = client.schedule_interview("Monday", "9:00-10:00", "a@b.com").await;
        assert_eq!(interview.error().unwrap().kind, ErrorKind::CircuitOpen);

        let received = mock_server.received_requests().await.unwrap();
        assert!(received.is_empty(), "sent {} requests", received.len());
    }

    #[tokio::test]
    async fn test_rediscover_without_discovery() {
        let client = BackendClient::builder().build().unwrap();
        assert!(client.rediscover_endpoint().await.is_none());
    }
}
