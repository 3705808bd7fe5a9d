//! Error types for the DDNS updater
//!
//! Per-tick failures ([`ResolutionError`], [`ProviderError`]) are recovered by
//! the engine and turned into status. Only [`Error::Config`] is returned to the
//! caller of `start()`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS updater
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (fatal to `start()`, not to the process)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every IP-echo endpoint failed
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The DDNS provider rejected the update or answered unexpectedly
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// State could not be written or read
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Whether this error must be reported to the caller of `start()`
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Failure to determine the public IP address
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionError {
    /// All configured IP-echo endpoints failed, timed out or returned garbage
    #[error("No IP resolver available")]
    NoResolverAvailable,
}

/// Failure reported by a DDNS provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Provider rejected the token or the domain
    #[error("Provider rejected the update: bad token or domain")]
    AuthOrDomain,

    /// Network error, unexpected status or unexpected body
    #[error("Provider update failed: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Create an unknown provider failure
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Closed failure reason used for status reporting
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::AuthOrDomain => FailureReason::AuthOrDomain,
            Self::Unknown(_) => FailureReason::Unknown,
        }
    }
}

/// Why an update attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No IP-echo endpoint produced a valid address
    NoResolverAvailable,
    /// Provider rejected the token or domain
    AuthOrDomain,
    /// Anything else
    Unknown,
}

impl From<ResolutionError> for FailureReason {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::NoResolverAvailable => FailureReason::NoResolverAvailable,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            FailureReason::NoResolverAvailable => "Could not detect IP",
            FailureReason::AuthOrDomain => "Invalid token or domain",
            FailureReason::Unknown => "Update error",
        };
        f.write_str(text)
    }
}
