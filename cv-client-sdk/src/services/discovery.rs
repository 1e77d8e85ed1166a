//! Endpoint discovery
//!
//! Probes candidate base URLs and query routes to find a working
//! combination. Probes run concurrently; private network candidates win
//! over public ones.
//! The first hit is cached for the lifetime of the resolver; when nothing
//! answers, the configured default is used and the failure is reported
//! instead of hidden.

use std::net::{IpAddr, Ipv6Addr};
use std::time::Duration;

use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::config::{join_url, BackendConfig};
use crate::util::{measure_time_async, millis};

/// Outcome of probing one URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub reachable: bool,
    pub latency_ms: f64,
    pub status_code: Option<u16>,
}

impl ProbeResult {
    fn answered(status: StatusCode, latency: Duration) -> Self {
        Self {
            reachable: true,
            latency_ms: millis(latency),
            status_code: Some(status.as_u16()),
        }
    }

    fn unreachable(latency: Duration) -> Self {
        Self {
            reachable: false,
            latency_ms: millis(latency),
            status_code: None,
        }
    }

    /// 200, or 405 meaning the route exists but not for this method
    pub fn found(&self) -> bool {
        matches!(self.status_code, Some(200) | Some(405))
    }
}

/// A probed (base URL, route) pair
#[derive(Debug, Clone, Serialize)]
pub struct EndpointCandidate {
    pub base_url: String,
    pub path: String,
    pub probe: ProbeResult,
}

/// A base URL and query route the client should use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEndpoint {
    pub base_url: String,
    pub path: String,
}

impl ResolvedEndpoint {
    /// Full query URL
    pub fn url(&self) -> String {
        join_url(&self.base_url, &self.path)
    }
}

/// Result of a discovery run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// A candidate answered
    Resolved(ResolvedEndpoint),
    /// Nothing answered; the configured default is in use
    Fallback {
        endpoint: ResolvedEndpoint,
        reason: String,
    },
}

impl Resolution {
    pub fn endpoint(&self) -> &ResolvedEndpoint {
        match self {
            Resolution::Resolved(endpoint) => endpoint,
            Resolution::Fallback { endpoint, .. } => endpoint,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback { .. })
    }

    /// One-line summary for health reports
    pub fn describe(&self) -> String {
        match self {
            Resolution::Resolved(endpoint) => format!("resolved: {}", endpoint.url()),
            Resolution::Fallback { endpoint, reason } => {
                format!("fallback: {} ({})", endpoint.url(), reason)
            }
        }
    }
}

/// Discovers and caches the query endpoint
#[derive(Debug)]
pub struct EndpointResolver {
    http: Client,
    probe_timeout: Duration,
    candidate_urls: Vec<String>,
    candidate_paths: Vec<String>,
    default_endpoint: ResolvedEndpoint,
    cache: Mutex<Option<Resolution>>,
}

impl EndpointResolver {
    /// Resolver over the configured primary URL, extra candidates and routes
    pub fn new(http: Client, config: &BackendConfig) -> Self {
        let mut candidate_urls = vec![config.base_url.clone()];
        for url in &config.candidate_urls {
            if !candidate_urls.contains(url) {
                candidate_urls.push(url.clone());
            }
        }

        let mut candidate_paths = vec![config.query_path.clone()];
        for path in &config.candidate_paths {
            if !candidate_paths.contains(path) {
                candidate_paths.push(path.clone());
            }
        }

        Self {
            http,
            probe_timeout: config.probe_timeout,
            candidate_urls,
            candidate_paths,
            default_endpoint: ResolvedEndpoint {
                base_url: config.base_url.clone(),
                path: config.query_path.clone(),
            },
            cache: Mutex::new(None),
        }
    }

    /// Probe every candidate concurrently and return the first hit in
    /// priority order.
    ///
    /// Does not touch the cache.
    pub async fn discover(&self, candidate_urls: &[String], candidate_paths: &[String]) -> Resolution {
        let candidates: Vec<ResolvedEndpoint> = order_candidates(candidate_urls)
            .into_iter()
            .flat_map(move |base_url| {
                candidate_paths.iter().map(move |path| ResolvedEndpoint {
                    base_url: base_url.clone(),
                    path: path.clone(),
                })
            })
            .collect();

        let probes = join_all(candidates.iter().map(|candidate| self.probe_endpoint(candidate))).await;

        let mut probed = Vec::with_capacity(candidates.len());
        for (endpoint, probe) in candidates.into_iter().zip(probes) {
            debug!(url = %endpoint.url(), reachable = probe.reachable, status = ?probe.status_code,
                latency_ms = probe.latency_ms, "Probed endpoint candidate");

            if probe.found() {
                info!(url = %endpoint.url(), "Discovered query endpoint");
                return Resolution::Resolved(endpoint);
            }

            probed.push(EndpointCandidate {
                base_url: endpoint.base_url,
                path: endpoint.path,
                probe,
            });
        }

        let reachable = probed.iter().filter(|c| c.probe.reachable).count();
        let reason = format!(
            "no working endpoint among {} candidates ({} reachable)",
            probed.len(),
            reachable
        );
        warn!(default = %self.default_endpoint.url(), "Endpoint discovery failed: {}", reason);

        Resolution::Fallback {
            endpoint: self.default_endpoint.clone(),
            reason,
        }
    }

    /// Cached resolution, discovering on first use
    pub async fn resolve(&self) -> Resolution {
        let mut cache = self.cache.lock().await;
        if let Some(resolution) = cache.as_ref() {
            return resolution.clone();
        }

        let resolution = self.discover(&self.candidate_urls, &self.candidate_paths).await;
        *cache = Some(resolution.clone());
        resolution
    }

    /// Drop the cached endpoint and probe again
    pub async fn rediscover(&self) -> Resolution {
        let mut cache = self.cache.lock().await;
        let resolution = self.discover(&self.candidate_urls, &self.candidate_paths).await;
        *cache = Some(resolution.clone());
        resolution
    }

    /// Forget the cached endpoint; the next `resolve` probes again
    pub async fn invalidate(&self) {
        if self.cache.lock().await.take().is_some() {
            debug!("Invalidated cached endpoint");
        }
    }

    /// Cached resolution without waiting for a discovery in progress
    pub fn cached(&self) -> Option<Resolution> {
        self.cache.try_lock().ok().and_then(|cache| cache.clone())
    }

    /// Endpoint used when nothing else is known
    pub fn default_endpoint(&self) -> &ResolvedEndpoint {
        &self.default_endpoint
    }

    async fn probe_endpoint(&self, endpoint: &ResolvedEndpoint) -> ProbeResult {
        self.probe(&endpoint.url()).await
    }

    // HEAD first; GET when the server does not implement HEAD or the HEAD
    // failed for a reason other than being unreachable
    async fn probe(&self, url: &str) -> ProbeResult {
        let (outcome, latency) =
            measure_time_async(|| self.http.head(url).timeout(self.probe_timeout).send()).await;

        match outcome {
            Ok(response) if response.status() != StatusCode::NOT_IMPLEMENTED => {
                return ProbeResult::answered(response.status(), latency);
            }
            Ok(_) => debug!(url = %url, "HEAD not implemented, probing with GET"),
            Err(e) if e.is_connect() || e.is_timeout() => {
                return ProbeResult::unreachable(latency);
            }
            Err(e) => debug!(url = %url, error = %e, "HEAD probe failed, probing with GET"),
        }

        let (outcome, latency) =
            measure_time_async(|| self.http.get(url).timeout(self.probe_timeout).send()).await;

        match outcome {
            Ok(response) => ProbeResult::answered(response.status(), latency),
            Err(_) => ProbeResult::unreachable(latency),
        }
    }
}

/// Stable ordering with private network hosts first
pub fn order_candidates(candidate_urls: &[String]) -> Vec<String> {
    let mut ordered = candidate_urls.to_vec();
    ordered.sort_by_key(|url| !is_private_host(url));
    ordered
}

/// Whether a base URL points at a loopback, private or internal host
pub fn is_private_host(base_url: &str) -> bool {
    let Ok(parsed) = Url::parse(base_url) else {
        return false;
    };

    match parsed.host() {
        Some(Host::Ipv4(ip)) => is_private_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_private_ip(IpAddr::V6(ip)),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".internal")
                || domain.ends_with(".local")
        }
        None => false,
    }
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => ip.is_loopback() || ip.is_private() || ip.is_link_local(),
        IpAddr::V6(ip) => ip.is_loopback() || is_unique_local(&ip) || is_unicast_link_local(&ip),
    }
}

// fc00::/7
fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

// fe80::/10
fn is_unicast_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_hosts() {
        assert!(is_private_host("http://localhost:8000"));
        assert!(is_private_host("http://127.0.0.1:8000"));
        assert!(is_private_host("http://10.1.2.3"));
        assert!(is_private_host("http://192.168.0.10:8080"));
        assert!(is_private_host("http://172.16.5.4"));
        assert!(is_private_host("http://169.254.1.1"));
        assert!(is_private_host("http://[::1]:8000"));
        assert!(is_private_host("http://[fd00::1]"));
        assert!(is_private_host("http://cv-backend.railway.internal:8080"));
        assert!(is_private_host("http://printer.local"));

        assert!(!is_private_host("https://cvbrain-production.up.railway.app"));
        assert!(!is_private_host("http://8.8.8.8"));
        assert!(!is_private_host("not a url"));
    }

    #[test]
    fn test_private_candidates_first_and_stable() {
        let urls = vec![
            "https://a.example.com".to_string(),
            "http://10.0.0.1".to_string(),
            "https://b.example.com".to_string(),
            "http://localhost:8000".to_string(),
        ];

        assert_eq!(
            order_candidates(&urls),
            vec![
                "http://10.0.0.1".to_string(),
                "http://localhost:8000".to_string(),
                "https://a.example.com".to_string(),
                "https://b.example.com".to_string(),
            ]
        );
    }

    #[test]
    fn test_probe_found_statuses() {
        let found = |code| ProbeResult {
            reachable: true,
            latency_ms: 1.0,
            status_code: Some(code),
        };
        assert!(found(200).found());
        assert!(found(405).found());
        assert!(!found(404).found());
        assert!(!ProbeResult::unreachable(Duration::ZERO).found());
    }

    #[test]
    fn test_resolution_describe() {
        let endpoint = ResolvedEndpoint {
            base_url: "http://localhost:8000/".to_string(),
            path: "/query".to_string(),
        };
        let resolved = Resolution::Resolved(endpoint.clone());
        assert_eq!(resolved.describe(), "resolved: http://localhost:8000/query");

        let fallback = Resolution::Fallback {
            endpoint,
            reason: "nothing answered".to_string(),
        };
        assert!(fallback.is_fallback());
        assert!(fallback.describe().starts_with("fallback: http://localhost:8000/query"));
    }

    #[test]
    fn test_resolver_candidates_deduplicated() {
        let config = BackendConfig {
            base_url: "http://localhost:8000".to_string(),
            candidate_urls: vec![
                "http://localhost:8000".to_string(),
                "http://10.0.0.2:8000".to_string(),
            ],
            ..BackendConfig::default()
        };
        let resolver = EndpointResolver::new(Client::new(), &config);

        assert_eq!(resolver.candidate_urls.len(), 2);
        assert_eq!(resolver.candidate_paths[0], "/query");
        assert_eq!(resolver.candidate_paths.len(), 3);
        assert!(resolver.cached().is_none());
    }
}
