// # IP Resolver Traits
//
// Defines how the engine learns the host's current public IP address.
//
// ## Layers
//
// - `IpEndpoint`: one IP-echo service, one raw fetch per call
// - `IpResolver`: produces a validated address, typically by walking an
//   ordered list of endpoints (see `resolver::FallbackResolver`)
//
// ## Implementations
//
// - HTTP echo services: `ngportal-ip-http` crate
// - Tests: scripted endpoints in `tests/common`

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::ResolutionError;

/// A single "what is my IP" service
///
/// # Trust Level: Untrusted
///
/// Endpoints are third-party services. Their answers are raw text that the
/// resolver validates before anything else sees it.
///
/// ## Allowed Capabilities
/// - ✅ One network request per call
///
/// ## Forbidden Capabilities
/// - ❌ Retry or sleep (the next scheduled tick is the retry)
/// - ❌ Parse or cache the address (owned by the resolver and the engine)
#[async_trait]
pub trait IpEndpoint: Send + Sync {
    /// Fetch the raw response body
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The untrimmed body
    /// - `Err(Error)`: Transport error or unsuccessful status
    async fn fetch(&self) -> Result<String, crate::Error>;

    /// Human readable identifier used in logs (usually the URL)
    fn describe(&self) -> String;
}

/// Trait for IP resolver implementations
///
/// A resolver never retries internally and never fails the process: every
/// failure collapses into [`ResolutionError::NoResolverAvailable`] and the
/// engine records it for this tick.
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Resolve the current public address
    ///
    /// # Parameters
    ///
    /// - `timeout_per_endpoint`: Upper bound for each individual endpoint call
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: A syntactically valid IPv4 or IPv6 address
    /// - `Err(ResolutionError)`: No endpoint produced a valid address
    async fn resolve(&self, timeout_per_endpoint: Duration) -> Result<IpAddr, ResolutionError>;
}
