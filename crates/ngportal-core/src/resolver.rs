//! Ordered fallback over IP-echo endpoints
//!
//! Endpoints are tried one after another. The first answer that parses as an
//! IP address wins and the remaining endpoints are not contacted. Each call
//! is bounded by the per-endpoint timeout, so a full pass takes at most
//! `endpoints.len() * timeout`.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, ResolutionError, Result};
use crate::traits::{IpEndpoint, IpResolver};

/// Resolver that walks a fixed list of endpoints in priority order
pub struct FallbackResolver {
    endpoints: Vec<Box<dyn IpEndpoint>>,
}

impl FallbackResolver {
    /// Create a resolver over `endpoints`, highest priority first
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the list is empty.
    pub fn new(endpoints: Vec<Box<dyn IpEndpoint>>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::config("At least one IP-echo endpoint is required"));
        }
        Ok(Self { endpoints })
    }

    /// Number of configured endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Parse an endpoint body into an address
///
/// Surrounding whitespace (trailing newlines in particular) is ignored.
pub fn parse_ip_response(body: &str) -> Option<IpAddr> {
    body.trim().parse().ok()
}

#[async_trait]
impl IpResolver for FallbackResolver {
    async fn resolve(
        &self,
        timeout_per_endpoint: Duration,
    ) -> std::result::Result<IpAddr, ResolutionError> {
        for endpoint in &self.endpoints {
            match tokio::time::timeout(timeout_per_endpoint, endpoint.fetch()).await {
                Ok(Ok(body)) => match parse_ip_response(&body) {
                    Some(ip) => {
                        debug!("Resolved {} via {}", ip, endpoint.describe());
                        return Ok(ip);
                    }
                    None => {
                        warn!(
                            "IP-echo endpoint {} returned malformed address: {:?}",
                            endpoint.describe(),
                            body.trim()
                        );
                    }
                },
                Ok(Err(e)) => {
                    warn!("IP-echo endpoint {} failed: {}", endpoint.describe(), e);
                }
                Err(_) => {
                    warn!(
                        "IP-echo endpoint {} timed out after {:?}",
                        endpoint.describe(),
                        timeout_per_endpoint
                    );
                }
            }
        }

        Err(ResolutionError::NoResolverAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Body(&'static str),
        Fail,
        Hang,
    }

    struct TestEndpoint {
        name: &'static str,
        reply: Reply,
        calls: Arc<AtomicUsize>,
    }

    impl TestEndpoint {
        fn boxed(name: &'static str, reply: Reply, calls: &Arc<AtomicUsize>) -> Box<dyn IpEndpoint> {
            Box::new(Self {
                name,
                reply,
                calls: Arc::clone(calls),
            })
        }
    }

    #[async_trait]
    impl IpEndpoint for TestEndpoint {
        async fn fetch(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Body(body) => Ok(body.to_string()),
                Reply::Fail => Err(Error::http("connection refused")),
                Reply::Hang => std::future::pending().await,
            }
        }

        fn describe(&self) -> String {
            self.name.to_string()
        }
    }

    #[test]
    fn test_empty_endpoint_list_rejected() {
        let err = FallbackResolver::new(Vec::new()).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_parse_ip_response() {
        assert_eq!(parse_ip_response("203.0.113.42\n"), Some(IpAddr::from([203, 0, 113, 42])));
        assert_eq!(
            parse_ip_response("  2001:db8::1 "),
            Some("2001:db8::1".parse().unwrap())
        );
        assert_eq!(parse_ip_response("<html>rate limited</html>"), None);
        assert_eq!(parse_ip_response(""), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_valid_answer_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let resolver = FallbackResolver::new(vec![
            TestEndpoint::boxed("a", Reply::Body("198.51.100.7\n"), &first),
            TestEndpoint::boxed("b", Reply::Body("203.0.113.1"), &second),
        ])
        .unwrap();

        let ip = resolver.resolve(Duration::from_secs(5)).await.unwrap();
        assert_eq!(ip, IpAddr::from([198, 51, 100, 7]));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0, "later endpoints must not be contacted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_through_failures_timeouts_and_garbage() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = FallbackResolver::new(vec![
            TestEndpoint::boxed("hang", Reply::Hang, &calls),
            TestEndpoint::boxed("fail", Reply::Fail, &calls),
            TestEndpoint::boxed("garbage", Reply::Body("not-an-ip"), &calls),
            TestEndpoint::boxed("good", Reply::Body("203.0.113.42"), &calls),
        ])
        .unwrap();

        let ip = resolver.resolve(Duration::from_secs(5)).await.unwrap();
        assert_eq!(ip, IpAddr::from([203, 0, 113, 42]));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failed_is_no_resolver_available() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = FallbackResolver::new(vec![
            TestEndpoint::boxed("hang", Reply::Hang, &calls),
            TestEndpoint::boxed("fail", Reply::Fail, &calls),
        ])
        .unwrap();

        let started = tokio::time::Instant::now();
        let err = resolver.resolve(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err, ResolutionError::NoResolverAvailable);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_usable_as_engine_resolver() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver: Box<dyn IpResolver> = Box::new(
            FallbackResolver::new(vec![TestEndpoint::boxed("fail", Reply::Fail, &calls)]).unwrap(),
        );

        let result: std::result::Result<IpAddr, ResolutionError> =
            resolver.resolve(Duration::from_secs(1)).await;
        assert_eq!(result, Err(ResolutionError::NoResolverAvailable));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
