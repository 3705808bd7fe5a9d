//! Test doubles and common utilities for engine contract tests
//!
//! Every double shares its counters through `Arc`, so a clone handed to the
//! engine and the copy kept by the test observe the same calls.

#![allow(dead_code)]

use async_trait::async_trait;
use ngportal_core::error::{Error, ProviderError, ResolutionError, Result};
use ngportal_core::traits::{DnsProvider, IpEndpoint, IpResolver, StateRecord, StateStore};
use ngportal_core::{AuthToken, EngineConfig, EngineEvent, UpdateOutcome};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Scenario domain label
pub const DOMAIN: &str = "myhouse";

/// Scenario token
pub const TOKEN: &str = "abc";

/// Scenario interval (5 minutes)
pub const INTERVAL_SECS: u64 = 300;

pub fn ip(octets: [u8; 4]) -> IpAddr {
    IpAddr::from(octets)
}

/// Engine settings used by the contract tests
pub fn engine_config() -> EngineConfig {
    EngineConfig::default()
}

/// Pops scripted values; the last one repeats forever
#[derive(Debug)]
struct Script<T: Clone> {
    replies: Mutex<VecDeque<T>>,
}

impl<T: Clone> Script<T> {
    fn new(replies: Vec<T>) -> Self {
        assert!(!replies.is_empty(), "script needs at least one reply");
        Self {
            replies: Mutex::new(replies.into()),
        }
    }

    fn next(&self) -> T {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap()
        }
    }
}

/// What a scripted IP-echo endpoint answers
#[derive(Debug, Clone)]
pub enum EndpointReply {
    Body(&'static str),
    Fail,
    Hang,
}

/// IP-echo endpoint with a fixed script
#[derive(Clone)]
pub struct ScriptedEndpoint {
    name: &'static str,
    script: Arc<Script<EndpointReply>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedEndpoint {
    pub fn new(name: &'static str, replies: Vec<EndpointReply>) -> Self {
        Self {
            name,
            script: Arc::new(Script::new(replies)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(name: &'static str, reply: EndpointReply) -> Self {
        Self::new(name, vec![reply])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn boxed(&self) -> Box<dyn IpEndpoint> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl IpEndpoint for ScriptedEndpoint {
    async fn fetch(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.next() {
            EndpointReply::Body(body) => Ok(body.to_string()),
            EndpointReply::Fail => Err(Error::http(format!("{} unreachable", self.name))),
            EndpointReply::Hang => std::future::pending().await,
        }
    }

    fn describe(&self) -> String {
        self.name.to_string()
    }
}

/// Resolver that answers each tick from a script
#[derive(Clone)]
pub struct SequenceResolver {
    script: Arc<Script<std::result::Result<IpAddr, ResolutionError>>>,
    calls: Arc<AtomicUsize>,
}

impl SequenceResolver {
    pub fn new(replies: Vec<std::result::Result<IpAddr, ResolutionError>>) -> Self {
        Self {
            script: Arc::new(Script::new(replies)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(ip: IpAddr) -> Self {
        Self::new(vec![Ok(ip)])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpResolver for SequenceResolver {
    async fn resolve(
        &self,
        _timeout_per_endpoint: Duration,
    ) -> std::result::Result<IpAddr, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.next()
    }
}

/// One recorded provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub domain: String,
    pub token: String,
    pub ip: IpAddr,
}

/// A mock DnsProvider that tracks calls and answers from a script
#[derive(Clone)]
pub struct MockDnsProvider {
    script: Arc<Script<std::result::Result<(), ProviderError>>>,
    calls: Arc<Mutex<Vec<ProviderCall>>>,
    delay: Option<Duration>,
}

impl MockDnsProvider {
    /// Provider that accepts every update
    pub fn accepting() -> Self {
        Self::scripted(vec![Ok(())])
    }

    pub fn scripted(replies: Vec<std::result::Result<(), ProviderError>>) -> Self {
        Self {
            script: Arc::new(Script::new(replies)),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Make every update take `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn update(
        &self,
        domain: &str,
        token: &AuthToken,
        ip: IpAddr,
    ) -> std::result::Result<(), ProviderError> {
        self.calls.lock().unwrap().push(ProviderCall {
            domain: domain.to_string(),
            token: token.expose().to_string(),
            ip,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script.next()
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A state store whose writes always fail
#[derive(Clone, Default)]
pub struct FailingStateStore {
    save_calls: Arc<AtomicUsize>,
    flush_calls: Arc<AtomicUsize>,
}

impl FailingStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn flush_count(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for FailingStateStore {
    async fn load(&self) -> Result<StateRecord> {
        Ok(StateRecord::default())
    }

    async fn save(&self, _record: &StateRecord) -> Result<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::persistence("disk full"))
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::persistence("disk full"))
    }
}

/// Receive events until one matches `pred`
///
/// Panics after an hour of (usually paused) test time.
pub async fn wait_for_event<F>(rx: &mut mpsc::Receiver<EngineEvent>, mut pred: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    let wait = async {
        while let Some(event) = rx.recv().await {
            if pred(&event) {
                return event;
            }
        }
        panic!("event channel closed");
    };

    tokio::time::timeout(Duration::from_secs(3600), wait)
        .await
        .expect("timed out waiting for engine event")
}

/// Wait for the next committed tick and return its outcome
pub async fn next_tick(rx: &mut mpsc::Receiver<EngineEvent>) -> UpdateOutcome {
    match wait_for_event(rx, |e| matches!(e, EngineEvent::TickCompleted { .. })).await {
        EngineEvent::TickCompleted { outcome } => outcome,
        other => unreachable!("unexpected event {:?}", other),
    }
}

/// Drain whatever is already queued
pub fn drain(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
