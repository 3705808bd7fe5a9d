// # DNS Provider Trait
//
// Defines the interface for pushing a new address to a DDNS provider.
//
// ## Implementations
//
// - DuckDNS: `ngportal-provider-duckdns` crate
// - Future: No-IP, Dynu, Cloudflare
//
// ## Usage
//
// ```rust,ignore
// use ngportal_core::{AuthToken, DnsProvider};
//
// let provider = /* DnsProvider implementation */;
// provider
//     .update("myhouse", &AuthToken::new("abc"), "203.0.113.42".parse()?)
//     .await?;
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::{AuthToken, ProviderKind};
use crate::error::ProviderError;

/// Trait for DDNS provider implementations
///
/// Implementations encode one provider's update protocol: the request shape
/// and how the response maps onto [`ProviderError`]. Adding a provider means
/// adding an implementation and registering its factory; the engine does not
/// change.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS calls to their own update endpoint only
/// - ✅ Parse provider-specific responses
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Retry or back off (the engine retries on the next tick)
/// - ❌ Access the state store
/// - ❌ Decide whether an update is needed (owned by `DdnsEngine`)
/// - ❌ Log the token
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Point `domain` at `ip`
    ///
    /// # Idempotency
    ///
    /// Sending the same update twice must leave the provider in the same
    /// state as sending it once.
    ///
    /// # Parameters
    ///
    /// - `domain`: Domain label as configured by the user
    /// - `token`: Provider credential
    /// - `ip`: Address to publish
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Provider acknowledged the update
    /// - `Err(ProviderError::AuthOrDomain)`: Provider rejected token or domain
    /// - `Err(ProviderError::Unknown)`: Anything else
    async fn update(&self, domain: &str, token: &AuthToken, ip: IpAddr)
    -> Result<(), ProviderError>;

    /// Check whether this provider can handle the domain label
    fn supports_domain(&self, domain: &str) -> bool {
        !domain.trim().is_empty()
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance
    ///
    /// # Parameters
    ///
    /// - `kind`: Which provider was selected
    /// - `endpoint`: Optional base URL override
    fn create(
        &self,
        kind: &ProviderKind,
        endpoint: Option<&str>,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
