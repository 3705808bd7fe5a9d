//! Persisted control-panel settings
//!
//! The settings file holds what the user typed into the DDNS form: domain,
//! provider, token and one of the offered update intervals. It is written
//! with the same write-then-rename scheme as the state file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{AuthToken, DdnsConfig, ProviderKind};
use crate::error::{Error, Result};
use crate::state::file::write_atomic;

/// Update intervals offered to the user, in minutes
pub const ALLOWED_INTERVAL_MINUTES: [u64; 4] = [5, 10, 15, 30];

/// User-facing DDNS settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdnsSettings {
    pub domain: String,

    #[serde(default)]
    pub provider: ProviderKind,

    pub token: AuthToken,

    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    #[serde(default)]
    pub enabled: bool,
}

impl DdnsSettings {
    pub fn new(domain: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            provider: ProviderKind::default(),
            token: AuthToken::new(token),
            interval_minutes: default_interval_minutes(),
            enabled: false,
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if !ALLOWED_INTERVAL_MINUTES.contains(&self.interval_minutes) {
            return Err(Error::config(format!(
                "Update interval must be one of {:?} minutes. Got: {}",
                ALLOWED_INTERVAL_MINUTES, self.interval_minutes
            )));
        }
        crate::config::validate_start_params(&self.domain, &self.token, self.interval_secs())
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_minutes * 60
    }

    /// Build an engine configuration with default resolver and engine sections
    pub fn to_config(&self) -> DdnsConfig {
        let mut config = DdnsConfig::new(self.domain.clone(), self.token.expose())
            .with_interval_secs(self.interval_secs());
        config.provider = self.provider.clone();
        config.enabled = self.enabled;
        config
    }

    /// Load settings from a JSON file
    ///
    /// # Returns
    ///
    /// - `Ok(Some(settings))`: File exists and parses
    /// - `Ok(None)`: No file yet
    /// - `Err(Error)`: File unreadable or malformed
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            tracing::debug!("Settings file does not exist: {}", path.display());
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        let settings = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse settings file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Some(settings))
    }

    /// Save settings atomically
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path.as_ref(), json.as_bytes()).await
    }
}

fn default_interval_minutes() -> u64 {
    5
}
