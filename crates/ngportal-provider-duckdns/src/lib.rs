// # DuckDNS Provider
//
// This crate provides the DuckDNS update protocol for the NGPortal DDNS updater.
//
// ## Protocol
//
// One idempotent GET per update:
//
// ```http
// GET /update?domains=<label>&token=<token>&ip=<address>
// ```
//
// The body is the whole answer:
// - `OK`: record updated (or already correct)
// - `KO`: token or domain rejected
// - anything else: unknown failure
//
// ## Trust Level: Untrusted (DNS Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS calls to the DuckDNS update endpoint only
// - ✅ Parse the response body
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Implement retry logic (the next tick is the retry)
// - ❌ Access state store (owned by DdnsEngine)
// - ❌ Decide whether an update is needed (owned by DdnsEngine)
//
// ## Security Requirements
//
// - Token NEVER appears in logs or error messages (request URLs are
//   stripped from transport errors because the token is a query parameter)

use async_trait::async_trait;
use ngportal_core::config::{AuthToken, ProviderKind};
use ngportal_core::error::ProviderError;
use ngportal_core::traits::{DnsProvider, DnsProviderFactory};
use ngportal_core::{Error, Result};
use std::net::IpAddr;
use std::time::Duration;

/// DuckDNS API base URL
pub const DUCKDNS_API_BASE: &str = "https://www.duckdns.org";

/// Suffix users often paste along with their label
const DUCKDNS_SUFFIX: &str = ".duckdns.org";

/// Default HTTP timeout for update requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest unexpected body echoed into an error
const MAX_ECHOED_BODY: usize = 64;

/// DuckDNS provider
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot: every `update()` is exactly one request.
/// The token is passed per call and never stored.
#[derive(Debug, Clone)]
pub struct DuckDnsProvider {
    /// Base URL without trailing slash
    base_url: String,

    /// HTTP client for update requests
    client: reqwest::Client,
}

impl DuckDnsProvider {
    /// Create a provider talking to www.duckdns.org
    pub fn new() -> Result<Self> {
        Self::with_base_url(DUCKDNS_API_BASE)
    }

    /// Create a provider talking to another base URL (tests, mirrors)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::config("DuckDNS base URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reduce `name.duckdns.org` to `name`
    pub fn normalize_domain(domain: &str) -> &str {
        let domain = domain.trim();
        let cut = domain.len().saturating_sub(DUCKDNS_SUFFIX.len());
        match domain.get(cut..) {
            Some(tail) if cut > 0 && tail.eq_ignore_ascii_case(DUCKDNS_SUFFIX) => &domain[..cut],
            _ => domain,
        }
    }
}

/// Map a DuckDNS response body onto the closed outcome set
///
/// Surrounding whitespace is ignored; the rest must match exactly.
pub fn interpret_response(body: &str) -> std::result::Result<(), ProviderError> {
    match body.trim() {
        "OK" => Ok(()),
        "KO" => Err(ProviderError::AuthOrDomain),
        other => {
            let echoed: String = other.chars().take(MAX_ECHOED_BODY).collect();
            Err(ProviderError::unknown(format!("Unexpected response: {:?}", echoed)))
        }
    }
}

#[async_trait]
impl DnsProvider for DuckDnsProvider {
    /// Point the DuckDNS label at `ip`
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /update?domains=myhouse&token=<token>&ip=203.0.113.42
    /// ```
    async fn update(
        &self,
        domain: &str,
        token: &AuthToken,
        ip: IpAddr,
    ) -> std::result::Result<(), ProviderError> {
        let label = Self::normalize_domain(domain);
        tracing::debug!("Sending DuckDNS update: {} -> {}", label, ip);

        let url = format!("{}/update", self.base_url);
        let ip_text = ip.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("domains", label),
                ("token", token.expose()),
                ("ip", ip_text.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::unknown(format!("HTTP request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::unknown(format!("HTTP error: {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::unknown(format!("Failed to read response: {}", e.without_url())))?;

        interpret_response(&body)?;

        tracing::info!("DuckDNS record updated: {} -> {}", label, ip);
        Ok(())
    }

    /// DuckDNS labels are letters, digits and hyphens
    fn supports_domain(&self, domain: &str) -> bool {
        let label = Self::normalize_domain(domain);
        !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    }

    fn provider_name(&self) -> &'static str {
        "duckdns"
    }
}

/// Factory for creating DuckDNS providers
pub struct DuckDnsFactory;

impl DnsProviderFactory for DuckDnsFactory {
    fn create(&self, kind: &ProviderKind, endpoint: Option<&str>) -> Result<Box<dyn DnsProvider>> {
        match kind {
            ProviderKind::DuckDns => {
                let provider = match endpoint {
                    Some(base_url) => {
                        tracing::info!("DuckDNS provider using custom endpoint {}", base_url);
                        DuckDnsProvider::with_base_url(base_url)?
                    }
                    None => DuckDnsProvider::new()?,
                };
                Ok(Box::new(provider))
            }
            _ => Err(Error::config("Invalid config for DuckDNS provider")),
        }
    }
}

/// Register the DuckDNS provider with a registry
///
/// # Example
///
/// ```rust
/// use ngportal_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// ngportal_provider_duckdns::register(&registry);
/// assert!(registry.has_provider("duckdns"));
/// ```
pub fn register(registry: &ngportal_core::ProviderRegistry) {
    registry.register_provider("duckdns", Box::new(DuckDnsFactory));
}
