//! Configuration types for the DDNS updater
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// IP-echo services queried in this order until one answers with a valid address
pub const DEFAULT_IP_ECHO_ENDPOINTS: &[&str] = &[
    "https://api.ipify.org",
    "https://icanhazip.com",
    "https://ifconfig.me/ip",
];

/// Main DDNS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// Domain label to keep up to date (e.g. "myhouse")
    pub domain: String,

    /// Which provider publishes the record
    #[serde(default)]
    pub provider: ProviderKind,

    /// Provider credential
    pub token: AuthToken,

    /// Seconds between ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Whether the updater should run at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// IP-echo endpoints
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DdnsConfig {
    /// Create a new configuration with defaults for everything but the credentials
    pub fn new(domain: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            provider: ProviderKind::default(),
            token: AuthToken::new(token),
            interval_secs: default_interval_secs(),
            enabled: default_enabled(),
            resolver: ResolverConfig::default(),
            state_store: StateStoreConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the tick interval
    pub fn with_interval_secs(mut self, interval_secs: u64) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_start_params(&self.domain, &self.token, self.interval_secs)?;
        self.resolver.validate()?;
        self.engine.validate()?;
        Ok(())
    }

    /// Tick interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Check the parameters `DdnsEngine::start` needs
pub(crate) fn validate_start_params(
    domain: &str,
    token: &AuthToken,
    interval_secs: u64,
) -> Result<(), crate::Error> {
    if domain.trim().is_empty() {
        return Err(crate::Error::config("Domain label cannot be empty"));
    }
    if token.is_empty() {
        return Err(crate::Error::config("Provider token cannot be empty"));
    }
    if interval_secs == 0 {
        return Err(crate::Error::config("Update interval must be > 0"));
    }
    Ok(())
}

/// Provider credential
///
/// `Debug` and `Display` never show the value.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building provider requests only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(<REDACTED>)")
    }
}

impl std::fmt::Display for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<REDACTED>")
    }
}

/// DDNS provider selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// DuckDNS (`/update?domains=..&token=..&ip=..`)
    #[default]
    DuckDns,

    /// Provider registered under a custom factory name
    Custom(String),
}

impl ProviderKind {
    /// Get the provider type name used for registry lookups
    pub fn type_name(&self) -> &str {
        match self {
            ProviderKind::DuckDns => "duckdns",
            ProviderKind::Custom(name) => name,
        }
    }

    /// Parse a provider name as typed by a user
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "duckdns" | "duck_dns" | "duck-dns" => ProviderKind::DuckDns,
            other => ProviderKind::Custom(other.to_string()),
        }
    }
}

/// IP-echo endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Endpoint URLs in fallback priority order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
}

impl ResolverConfig {
    /// Validate the resolver configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.endpoints.is_empty() {
            return Err(crate::Error::config("At least one IP-echo endpoint is required"));
        }
        if let Some(bad) = self.endpoints.iter().find(|url| url.trim().is_empty()) {
            return Err(crate::Error::config(format!(
                "IP-echo endpoint URL cannot be empty (got {:?})",
                bad
            )));
        }
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,

    /// Custom state store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StateStoreConfig {
    /// Get the store type name used for registry lookups
    pub fn type_name(&self) -> &str {
        match self {
            StateStoreConfig::File { .. } => "file",
            StateStoreConfig::Memory => "memory",
            StateStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for each IP-echo request (in seconds)
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,

    /// Capacity of the status event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// How many past attempts `status()` reports
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.resolve_timeout_secs == 0 {
            return Err(crate::Error::config("Resolve timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.history_capacity == 0 {
            return Err(crate::Error::config("History capacity must be > 0"));
        }
        Ok(())
    }

    /// Per-endpoint resolve timeout
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_secs: default_resolve_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            history_capacity: default_history_capacity(),
        }
    }
}

fn default_endpoints() -> Vec<String> {
    DEFAULT_IP_ECHO_ENDPOINTS.iter().map(|s| s.to_string()).collect()
}

fn default_interval_secs() -> u64 {
    300
}

fn default_enabled() -> bool {
    true
}

fn default_resolve_timeout_secs() -> u64 {
    5
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_history_capacity() -> usize {
    20
}
