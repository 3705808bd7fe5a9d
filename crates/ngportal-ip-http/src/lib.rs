// # HTTP IP-Echo Endpoints
//
// This crate provides the HTTP endpoints the resolver asks for the host's
// public IP address.
//
// ## Purpose
//
// Each endpoint is a plain GET against a "what is my IP" service whose body
// is the caller's address as text. Parsing, ordering and per-call timeouts
// are handled by `ngportal_core::FallbackResolver`; this crate only speaks
// HTTP.
//
// ## Default Order
//
// 1. https://api.ipify.org
// 2. https://icanhazip.com
// 3. https://ifconfig.me/ip

use async_trait::async_trait;
use ngportal_core::config::{DEFAULT_IP_ECHO_ENDPOINTS, ResolverConfig};
use ngportal_core::traits::IpEndpoint;
use ngportal_core::{Error, FallbackResolver, Result};
use std::time::Duration;

/// Client-level timeout, a backstop behind the resolver's per-call timeout
const CLIENT_TIMEOUT_SECS: u64 = 10;

/// One HTTP IP-echo service
#[derive(Debug, Clone)]
pub struct HttpEchoEndpoint {
    /// URL to fetch the address from
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpEchoEndpoint {
    /// Create an endpoint with its own client
    ///
    /// # Parameters
    ///
    /// - `url`: URL to fetch the address from (e.g., "https://api.ipify.org")
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CLIENT_TIMEOUT_SECS))
            .user_agent(concat!("ngportal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(url, client))
    }

    /// Create an endpoint sharing an existing client
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IpEndpoint for HttpEchoEndpoint {
    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!("HTTP error: {}", response.status())));
        }

        response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Build a fallback resolver over the configured endpoint URLs
///
/// All endpoints share one HTTP client.
pub fn resolver_for(config: &ResolverConfig) -> Result<FallbackResolver> {
    config.validate()?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(CLIENT_TIMEOUT_SECS))
        .user_agent(concat!("ngportal/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

    let endpoints = config
        .endpoints
        .iter()
        .map(|url| {
            Box::new(HttpEchoEndpoint::with_client(url.trim(), client.clone()))
                as Box<dyn IpEndpoint>
        })
        .collect();

    tracing::debug!("IP-echo endpoints: {:?}", config.endpoints);
    FallbackResolver::new(endpoints)
}

/// Resolver over the default ipify → icanhazip → ifconfig.me order
pub fn default_resolver() -> Result<FallbackResolver> {
    resolver_for(&ResolverConfig {
        endpoints: DEFAULT_IP_ECHO_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
    })
}
