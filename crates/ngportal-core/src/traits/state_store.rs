// # State Store Trait
//
// Defines the interface for persisting updater state across restarts.
//
// ## Purpose
//
// The store remembers:
// - The last IP the provider accepted
// - When that happened
// - The last status line shown to the user
//
// so that a restart does not re-send an update the provider already has.
//
// ## Implementations
//
// - File-based: JSON with write-then-rename (`state::FileStateStore`)
// - In-memory: tests and ephemeral runs (`state::MemoryStateStore`)
//
// ## Usage
//
// ```rust,ignore
// use ngportal_core::StateStore;
//
// let store = /* StateStore implementation */;
// let mut record = store.load().await?;
// record.last_ip = Some("203.0.113.42".parse()?);
// store.save(&record).await?;
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;

use crate::config::StateStoreConfig;
use crate::status::UpdateAttempt;

/// Persisted updater state
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StateRecord {
    /// Domain label the state belongs to
    #[serde(default)]
    pub domain: Option<String>,
    /// The last IP the provider accepted
    #[serde(default)]
    pub last_ip: Option<IpAddr>,
    /// Timestamp of the last accepted update
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Status line of the last tick
    #[serde(default)]
    pub last_status: Option<String>,
    /// Full record of the last tick
    #[serde(default)]
    pub last_attempt: Option<UpdateAttempt>,
}

impl StateRecord {
    /// Last accepted IP, but only if the record belongs to `domain`
    ///
    /// A record written for another hostname says nothing about what the
    /// provider has published for this one.
    pub fn last_ip_for(&self, domain: &str) -> Option<IpAddr> {
        match self.domain.as_deref() {
            Some(stored) if stored == domain => self.last_ip,
            _ => None,
        }
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.domain.is_none() && self.last_ip.is_none() && self.last_attempt.is_none()
    }
}

/// Trait for state store implementations
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Implement locking for thread safety
///
/// ## Forbidden Capabilities
/// - ❌ Spawn background tasks
/// - ❌ Compare addresses or decide when to update (owned by `DdnsEngine`)
///
/// ## Implementation Guidelines
///
/// - **No torn records**: `save()` must replace the whole record atomically
///   (write new, then replace); never patch in place
/// - **Passive**: only called by the engine, after a tick completes
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the stored record
    ///
    /// # Returns
    ///
    /// - `Ok(StateRecord)`: The stored record, or an empty one if nothing was stored
    /// - `Err(Error)`: Storage error
    async fn load(&self) -> Result<StateRecord, crate::Error>;

    /// Replace the stored record
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Record durably replaced
    /// - `Err(Error::Persistence)`: Write failed, previous record left intact
    async fn save(&self, record: &StateRecord) -> Result<(), crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing state stores from configuration
#[async_trait]
pub trait StateStoreFactory: Send + Sync {
    /// Create a StateStore instance from configuration
    async fn create(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>, crate::Error>;
}
