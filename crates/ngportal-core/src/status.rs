//! Update outcomes and engine status snapshots
//!
//! These are the values the surrounding application displays. They are plain
//! data: the engine produces them, nothing else mutates them.

use crate::error::FailureReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Lifecycle phase of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not scheduled
    #[default]
    Idle,
    /// Timer armed, ticks firing
    Running,
    /// `stop()` called, waiting for the in-flight tick to drain
    Stopping,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum UpdateOutcome {
    /// Provider accepted the new address
    Success,
    /// Resolved address equals the stored one, provider not called
    NoChange,
    /// Resolution or provider update failed
    Failure(FailureReason),
}

impl UpdateOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, UpdateOutcome::Failure(_))
    }
}

impl std::fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateOutcome::Success => f.write_str("Success"),
            UpdateOutcome::NoChange => f.write_str("No change"),
            UpdateOutcome::Failure(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

/// One recorded tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAttempt {
    /// When the tick committed
    pub timestamp: DateTime<Utc>,
    /// Address resolved during the tick (absent when resolution failed)
    pub resolved_ip: Option<IpAddr>,
    /// What happened
    pub outcome: UpdateOutcome,
}

impl UpdateAttempt {
    pub(crate) fn now(resolved_ip: Option<IpAddr>, outcome: UpdateOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            resolved_ip,
            outcome,
        }
    }
}

/// Immutable snapshot of engine state handed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    /// `true` while the timer is armed
    pub is_running: bool,
    /// Current lifecycle phase
    pub phase: Phase,
    /// Domain label of the active (or last) run
    pub domain: Option<String>,
    /// Address the provider last accepted
    pub last_known_ip: Option<IpAddr>,
    /// When the provider last accepted an update
    pub last_update: Option<DateTime<Utc>>,
    /// Outcome of the most recent tick
    pub last_status: Option<UpdateOutcome>,
    /// Human readable status line
    pub last_status_text: String,
    /// Most recent attempts, oldest first
    pub history: Vec<UpdateAttempt>,
    /// State is no longer being written to the store for this run
    pub persistence_degraded: bool,
}

/// Status line: the latest outcome, or the phase when nothing has run yet
pub(crate) fn status_text(phase: Phase, outcome: Option<UpdateOutcome>) -> String {
    match (phase, outcome) {
        (_, Some(outcome)) => outcome.to_string(),
        (Phase::Idle, None) => "Idle".to_string(),
        (Phase::Running, None) => "Starting".to_string(),
        (Phase::Stopping, None) => "Stopping".to_string(),
    }
}
