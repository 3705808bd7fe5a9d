//! Core DDNS engine
//!
//! The DdnsEngine is responsible for:
//! - Resolving the public IP on every scheduled tick
//! - Comparing it with the last address the provider accepted
//! - Updating the DNS record via DnsProvider when it changed
//! - Persisting the outcome through StateStore
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Scheduler  │─── TickContext ─────┐
//! └─────────────┘                     │
//!                                     ▼
//!                            ┌──────────────┐
//!                            │ DdnsEngine   │
//!                            └──────────────┘
//!                                     │
//!         ┌──────────────┬────────────┼──────────────┬──────────────┐
//!         ▼              ▼            ▼              ▼              ▼
//! ┌─────────────┐ ┌────────────┐ ┌──────────┐ ┌────────────┐ ┌──────────┐
//! │ IpResolver  │ │  compare   │ │ Provider │ │ StateStore │ │  Events  │
//! │ (resolve)   │ │ (pre-tick) │ │ (update) │ │ (persist)  │ │ (notify) │
//! └─────────────┘ └────────────┘ └──────────┘ └────────────┘ └──────────┘
//! ```
//!
//! ## Tick Flow
//!
//! 1. Read the stored last known IP (before resolving)
//! 2. Resolve the current IP
//! 3. Equal to the stored IP: record `NoChange`, provider not called
//! 4. Different or unknown: call the provider; only `Success` moves the
//!    stored IP forward
//! 5. Tick cancelled by `stop()` meanwhile: discard the result
//! 6. Commit to in-memory state, then persist
//!
//! ## Lifecycle
//!
//! ```text
//! Idle --start()--> Running --stop()--> Stopping --(tick drained)--> Idle
//! ```

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::{AuthToken, DdnsConfig, EngineConfig, validate_start_params};
use crate::error::{Error, FailureReason, Result};
use crate::scheduler::{Scheduler, TickContext};
use crate::status::{EngineStatus, Phase, UpdateAttempt, UpdateOutcome, status_text};
use crate::traits::{DnsProvider, IpResolver, StateRecord, StateStore};

/// Events emitted by the DdnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Timer armed for a domain
    Started { domain: String, interval_secs: u64 },

    /// Public IP determined for this tick
    IpResolved { ip: IpAddr },

    /// No IP-echo endpoint produced an address
    ResolutionFailed { error: String },

    /// Provider call about to be made
    UpdateStarted {
        domain: String,
        new_ip: IpAddr,
        previous_ip: Option<IpAddr>,
    },

    /// Provider accepted the new address
    UpdateSucceeded {
        domain: String,
        new_ip: IpAddr,
        previous_ip: Option<IpAddr>,
    },

    /// Address unchanged, provider not called
    UpdateSkipped { domain: String, current_ip: IpAddr },

    /// Provider rejected the update or could not be reached
    UpdateFailed {
        domain: String,
        reason: FailureReason,
        error: String,
    },

    /// Tick finished after `stop()`; its outcome was not committed
    ResultDiscarded { outcome: UpdateOutcome },

    /// State could not be written; the rest of this run is memory-only
    PersistenceFailed { error: String },

    /// Tick committed
    TickCompleted { outcome: UpdateOutcome },

    /// `stop()` called, waiting for the in-flight tick
    Stopping,

    /// Timer cancelled and state flushed
    Stopped { reason: String },
}

/// Credentials of the active run, captured by every tick
struct RunSettings {
    domain: String,
    token: AuthToken,
}

/// Mutable engine state, only touched by ticks and lifecycle calls
#[derive(Debug, Default)]
struct EngineState {
    phase: Phase,
    domain: Option<String>,
    last_known_ip: Option<IpAddr>,
    last_update: Option<DateTime<Utc>>,
    last_attempt: Option<UpdateAttempt>,
    history: VecDeque<UpdateAttempt>,
    persistence_degraded: bool,
}

impl EngineState {
    fn push_history(&mut self, attempt: UpdateAttempt, capacity: usize) {
        while self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(attempt);
    }

    /// Restore what the store remembers about `domain`
    fn restore(&mut self, domain: &str, record: &StateRecord, capacity: usize) {
        self.history.clear();
        self.last_known_ip = record.last_ip_for(domain);

        if record.domain.as_deref() == Some(domain) {
            self.last_update = record.last_updated;
            self.last_attempt = record.last_attempt.clone();
            if let Some(attempt) = &record.last_attempt {
                self.push_history(attempt.clone(), capacity);
            }
        } else {
            self.last_update = None;
            self.last_attempt = None;
        }
    }

    fn to_record(&self) -> StateRecord {
        StateRecord {
            domain: self.domain.clone(),
            last_ip: self.last_known_ip,
            last_updated: self.last_update,
            last_status: self.last_attempt.as_ref().map(|a| a.outcome.to_string()),
            last_attempt: self.last_attempt.clone(),
        }
    }

    fn snapshot(&self) -> EngineStatus {
        let last_status = self.last_attempt.as_ref().map(|a| a.outcome);
        EngineStatus {
            is_running: self.phase == Phase::Running,
            phase: self.phase,
            domain: self.domain.clone(),
            last_known_ip: self.last_known_ip,
            last_update: self.last_update,
            last_status,
            last_status_text: status_text(self.phase, last_status),
            history: self.history.iter().cloned().collect(),
            persistence_degraded: self.persistence_degraded,
        }
    }
}

/// Shared between the engine handle and the scheduled ticks
struct EngineInner {
    resolver: Box<dyn IpResolver>,
    provider: Box<dyn DnsProvider>,
    state_store: Box<dyn StateStore>,
    config: EngineConfig,
    state: RwLock<EngineState>,
    event_tx: mpsc::Sender<EngineEvent>,

    /// Set once a send finds the receiver dropped
    receiver_gone: AtomicBool,
}

/// Core DDNS engine
///
/// The engine owns the tick scheduler and all updater state. Callers only
/// ever see [`EngineStatus`] snapshots and [`EngineEvent`]s.
///
/// ## Lifecycle
///
/// 1. Create with [`DdnsEngine::new()`]
/// 2. Start with [`DdnsEngine::start()`]
/// 3. Observe with [`DdnsEngine::status()`] or the event receiver
/// 4. Stop with [`DdnsEngine::stop()`]; dropping the engine also cancels the timer
///
/// ## Concurrency
///
/// At most one tick runs at a time (enforced by the scheduler), so at most
/// one provider call is in flight. `start()` and `stop()` are serialized.
///
/// ## Load Resistance
///
/// - **Bounded event channel**: Prevents unbounded memory growth
/// - **Event dropping**: When the channel is full, new events are dropped (logged)
/// - **Bounded history**: Only the last `history_capacity` attempts are kept
pub struct DdnsEngine {
    inner: Arc<EngineInner>,
    scheduler: Mutex<Scheduler>,
}

impl DdnsEngine {
    /// Create a new DDNS engine
    ///
    /// # Parameters
    ///
    /// - `resolver`: IP resolver implementation
    /// - `provider`: DNS provider implementation
    /// - `state_store`: State store implementation
    /// - `config`: Engine settings
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        resolver: Box<dyn IpResolver>,
        provider: Box<dyn DnsProvider>,
        state_store: Box<dyn StateStore>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            inner: Arc::new(EngineInner {
                resolver,
                provider,
                state_store,
                config,
                state: RwLock::new(EngineState::default()),
                event_tx: tx,
                receiver_gone: AtomicBool::new(false),
            }),
            scheduler: Mutex::new(Scheduler::new()),
        };

        Ok((engine, rx))
    }

    /// Start periodic updates for `domain`
    ///
    /// The first tick runs immediately.
    ///
    /// # Returns
    ///
    /// - `Ok(EngineStatus)`: Running; if it already was, nothing changed and
    ///   the arguments are not looked at
    /// - `Err(Error::Config)`: Empty domain or token, zero interval, or a
    ///   domain the provider cannot handle
    pub async fn start(
        &self,
        domain: &str,
        token: &str,
        interval_secs: u64,
    ) -> Result<EngineStatus> {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_running() {
            debug!("Engine already running, start ignored");
            return Ok(self.status());
        }

        let token = AuthToken::new(token);
        validate_start_params(domain, &token, interval_secs)?;

        let domain = domain.trim().to_string();
        if !self.inner.provider.supports_domain(&domain) {
            return Err(Error::config(format!(
                "Provider {} does not support domain {}",
                self.inner.provider.provider_name(),
                domain
            )));
        }

        let (record, load_failed) = match self.inner.state_store.load().await {
            Ok(record) => (record, false),
            Err(e) => {
                warn!("Failed to load stored state, continuing in memory only: {}", e);
                (StateRecord::default(), true)
            }
        };

        {
            let mut state = self.inner.write_state();
            // Memory is never older than the store for the same domain
            let keep_memory =
                state.domain.as_deref() == Some(domain.as_str()) && state.last_attempt.is_some();
            if !keep_memory {
                state.restore(&domain, &record, self.inner.config.history_capacity);
            }
            state.domain = Some(domain.clone());
            state.phase = Phase::Running;
            state.persistence_degraded = load_failed;
        }

        if load_failed {
            self.inner.emit_event(EngineEvent::PersistenceFailed {
                error: "state could not be loaded".to_string(),
            });
        }
        self.inner.emit_event(EngineEvent::Started {
            domain: domain.clone(),
            interval_secs,
        });

        let run = Arc::new(RunSettings { domain, token });
        let inner = Arc::clone(&self.inner);
        scheduler.start(Duration::from_secs(interval_secs), move |ctx| {
            let inner = Arc::clone(&inner);
            let run = Arc::clone(&run);
            async move { inner.run_tick(&run, ctx).await }
        });

        info!(
            "DDNS updater started via {} (every {}s)",
            self.inner.provider.provider_name(),
            interval_secs
        );
        Ok(self.status())
    }

    /// Start from a full configuration
    ///
    /// A disabled configuration leaves the engine as it is.
    pub async fn start_with_config(&self, config: &DdnsConfig) -> Result<EngineStatus> {
        config.validate()?;
        if !config.enabled {
            info!("DDNS updater disabled in configuration, not starting");
            return Ok(self.status());
        }
        self.start(&config.domain, config.token.expose(), config.interval_secs)
            .await
    }

    /// Stop periodic updates
    ///
    /// Waits for an in-flight tick to finish (its result is discarded),
    /// then flushes the state store. Calling this while idle does nothing.
    pub async fn stop(&self) -> EngineStatus {
        let mut scheduler = self.scheduler.lock().await;
        if !scheduler.is_running() {
            debug!("Engine not running, stop ignored");
            return self.status();
        }

        self.inner.write_state().phase = Phase::Stopping;
        self.inner.emit_event(EngineEvent::Stopping);

        scheduler.stop().await;

        let degraded = {
            let mut state = self.inner.write_state();
            state.phase = Phase::Idle;
            state.persistence_degraded
        };

        if !degraded && let Err(e) = self.inner.state_store.flush().await {
            warn!("Failed to flush state on stop: {}", e);
        }

        self.inner.emit_event(EngineEvent::Stopped {
            reason: "stop requested".to_string(),
        });
        info!("DDNS updater stopped");
        self.status()
    }

    /// Snapshot of the current state
    pub fn status(&self) -> EngineStatus {
        self.inner.read_state().snapshot()
    }

    /// Engine settings this instance was built with
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

impl EngineInner {
    fn read_state(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// One scheduled reconciliation
    async fn run_tick(&self, run: &RunSettings, ctx: TickContext) {
        // Compare against what was stored before this tick, never against
        // anything this tick produced
        let previous_ip = self.read_state().last_known_ip;
        debug!("Tick {} for {} (stored IP: {:?})", ctx.sequence(), run.domain, previous_ip);

        let (resolved_ip, outcome, detail) = self.reconcile(run, previous_ip).await;

        if ctx.is_cancelled() {
            info!("Tick {} finished after stop, discarding {}", ctx.sequence(), outcome);
            self.emit_event(EngineEvent::ResultDiscarded { outcome });
            return;
        }

        let attempt = UpdateAttempt::now(resolved_ip, outcome);
        let record = self.commit(attempt);

        match (outcome, resolved_ip) {
            (UpdateOutcome::Success, Some(new_ip)) => {
                self.emit_event(EngineEvent::UpdateSucceeded {
                    domain: run.domain.clone(),
                    new_ip,
                    previous_ip,
                });
            }
            (UpdateOutcome::NoChange, Some(current_ip)) => {
                self.emit_event(EngineEvent::UpdateSkipped {
                    domain: run.domain.clone(),
                    current_ip,
                });
            }
            (UpdateOutcome::Failure(reason), Some(_)) => {
                self.emit_event(EngineEvent::UpdateFailed {
                    domain: run.domain.clone(),
                    reason,
                    error: detail.unwrap_or_else(|| reason.to_string()),
                });
            }
            _ => {}
        }

        if let Some(record) = record {
            self.persist(&record).await;
        }

        self.emit_event(EngineEvent::TickCompleted { outcome });
    }

    /// Resolve, compare and update; nothing is committed here
    async fn reconcile(
        &self,
        run: &RunSettings,
        previous_ip: Option<IpAddr>,
    ) -> (Option<IpAddr>, UpdateOutcome, Option<String>) {
        let ip = match self.resolver.resolve(self.config.resolve_timeout()).await {
            Ok(ip) => ip,
            Err(e) => {
                warn!("Could not determine public IP: {}", e);
                self.emit_event(EngineEvent::ResolutionFailed {
                    error: e.to_string(),
                });
                return (None, UpdateOutcome::Failure(e.into()), None);
            }
        };
        self.emit_event(EngineEvent::IpResolved { ip });

        if previous_ip == Some(ip) {
            debug!("{} already points at {}, skipping update", run.domain, ip);
            return (Some(ip), UpdateOutcome::NoChange, None);
        }

        self.emit_event(EngineEvent::UpdateStarted {
            domain: run.domain.clone(),
            new_ip: ip,
            previous_ip,
        });

        match self.provider.update(&run.domain, &run.token, ip).await {
            Ok(()) => {
                info!("Updated {} -> {} (previous: {:?})", run.domain, ip, previous_ip);
                (Some(ip), UpdateOutcome::Success, None)
            }
            Err(e) => {
                warn!(
                    "{} update for {} failed: {}",
                    self.provider.provider_name(),
                    run.domain,
                    e
                );
                (Some(ip), UpdateOutcome::Failure(e.reason()), Some(e.to_string()))
            }
        }
    }

    /// Apply a finished attempt to memory
    ///
    /// # Returns
    ///
    /// The record to persist, or `None` when this run is memory-only.
    fn commit(&self, attempt: UpdateAttempt) -> Option<StateRecord> {
        let mut state = self.write_state();

        if attempt.outcome == UpdateOutcome::Success {
            state.last_known_ip = attempt.resolved_ip;
            state.last_update = Some(attempt.timestamp);
        }
        state.last_attempt = Some(attempt.clone());
        state.push_history(attempt, self.config.history_capacity);

        if state.persistence_degraded {
            None
        } else {
            Some(state.to_record())
        }
    }

    async fn persist(&self, record: &StateRecord) {
        if let Err(e) = self.state_store.save(record).await {
            error!("Failed to persist DDNS state, continuing in memory only: {}", e);
            self.write_state().persistence_degraded = true;
            self.emit_event(EngineEvent::PersistenceFailed {
                error: e.to_string(),
            });
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            // Never block a tick on observers
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {
                if !self.receiver_gone.swap(true, Ordering::Relaxed) {
                    debug!("Event receiver dropped, engine events are no longer delivered");
                }
            }
        }
    }
}
