//! Contract Test: End-to-End Update Scenarios
//!
//! Domain "myhouse", token "abc", interval 300s.
//!
//! Scenarios verified:
//! - Resolvers [timeout, timeout, 203.0.113.42] → one provider call with
//!   ip=203.0.113.42, status Success, last known IP 203.0.113.42
//! - Next tick resolves the same address → no further provider call, status
//!   NoChange
//! - Provider answers KO → Failure(AuthOrDomain), last known IP unchanged,
//!   engine still Running and retrying on the next tick
//! - Unexpected provider answer → Failure(Unknown)

mod common;

use common::*;
use ngportal_core::error::ProviderError;
use ngportal_core::traits::StateRecord;
use ngportal_core::{
    DdnsEngine, EngineEvent, FailureReason, FallbackResolver, MemoryStateStore, Phase,
    UpdateOutcome,
};

#[tokio::test(start_paused = true)]
async fn myhouse_update_then_no_change() {
    let first = ScriptedEndpoint::always("api.ipify.org", EndpointReply::Hang);
    let second = ScriptedEndpoint::always("icanhazip.com", EndpointReply::Hang);
    let third = ScriptedEndpoint::always("ifconfig.me", EndpointReply::Body("203.0.113.42\n"));
    let resolver =
        FallbackResolver::new(vec![first.boxed(), second.boxed(), third.boxed()]).unwrap();
    let provider = MockDnsProvider::accepting();

    let (engine, mut events) = DdnsEngine::new(
        Box::new(resolver),
        Box::new(provider.clone()),
        Box::new(MemoryStateStore::new()),
        engine_config(),
    )
    .unwrap();

    engine.start(DOMAIN, TOKEN, INTERVAL_SECS).await.unwrap();

    assert_eq!(next_tick(&mut events).await, UpdateOutcome::Success);
    assert_eq!(
        provider.calls(),
        vec![ProviderCall {
            domain: "myhouse".to_string(),
            token: "abc".to_string(),
            ip: ip([203, 0, 113, 42]),
        }]
    );

    let status = engine.status();
    assert_eq!(status.last_status, Some(UpdateOutcome::Success));
    assert_eq!(status.last_status_text, "Success");
    assert_eq!(status.last_known_ip, Some(ip([203, 0, 113, 42])));
    let updated_at = status.last_update.expect("successful update sets the timestamp");

    // Second tick, same address
    assert_eq!(next_tick(&mut events).await, UpdateOutcome::NoChange);
    assert_eq!(provider.call_count(), 1, "no additional provider call");

    let status = engine.status();
    assert_eq!(status.last_status, Some(UpdateOutcome::NoChange));
    assert_eq!(status.last_known_ip, Some(ip([203, 0, 113, 42])));
    assert_eq!(status.last_update, Some(updated_at));
    assert_eq!(third.call_count(), 2);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn provider_rejection_keeps_last_known_ip_and_retries() {
    let previous = ip([198, 51, 100, 1]);
    let store = MemoryStateStore::with_record(StateRecord {
        domain: Some(DOMAIN.to_string()),
        last_ip: Some(previous),
        ..Default::default()
    });
    let provider = MockDnsProvider::scripted(vec![Err(ProviderError::AuthOrDomain)]);

    let (engine, mut events) = DdnsEngine::new(
        Box::new(SequenceResolver::always(ip([203, 0, 113, 42]))),
        Box::new(provider.clone()),
        Box::new(store),
        engine_config(),
    )
    .unwrap();

    engine.start(DOMAIN, TOKEN, INTERVAL_SECS).await.unwrap();

    let failure = UpdateOutcome::Failure(FailureReason::AuthOrDomain);
    assert_eq!(next_tick(&mut events).await, failure);

    let status = engine.status();
    assert_eq!(status.last_known_ip, Some(previous));
    assert_eq!(status.last_status_text, "Failed: Invalid token or domain");
    assert_eq!(status.phase, Phase::Running);
    assert!(status.is_running);

    // The same transition is attempted again on the next tick
    assert_eq!(next_tick(&mut events).await, failure);
    assert_eq!(provider.call_count(), 2);
    assert!(provider.calls().iter().all(|c| c.ip == ip([203, 0, 113, 42])));

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unexpected_provider_answer_is_unknown_failure() {
    let provider = MockDnsProvider::scripted(vec![
        Err(ProviderError::unknown("unexpected response: maybe")),
        Ok(()),
    ]);

    let (engine, mut events) = DdnsEngine::new(
        Box::new(SequenceResolver::always(ip([203, 0, 113, 42]))),
        Box::new(provider.clone()),
        Box::new(MemoryStateStore::new()),
        engine_config(),
    )
    .unwrap();

    engine.start(DOMAIN, TOKEN, INTERVAL_SECS).await.unwrap();

    let failed = wait_for_event(&mut events, |e| matches!(e, EngineEvent::UpdateFailed { .. })).await;
    match failed {
        EngineEvent::UpdateFailed { reason, error, .. } => {
            assert_eq!(reason, FailureReason::Unknown);
            assert!(error.contains("maybe"));
        }
        other => unreachable!("unexpected event {:?}", other),
    }
    assert_eq!(
        next_tick(&mut events).await,
        UpdateOutcome::Failure(FailureReason::Unknown)
    );
    assert_eq!(engine.status().last_known_ip, None);

    // Recovery on the next tick
    assert_eq!(next_tick(&mut events).await, UpdateOutcome::Success);
    assert_eq!(engine.status().last_known_ip, Some(ip([203, 0, 113, 42])));

    engine.stop().await;
}
