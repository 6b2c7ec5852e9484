//! Process start, adapter wiring and teardown

mod common;

use common::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use converse_core::adapters::{EngineCallEvent, EngineRegistrationEvent, EventSinks, TelephonyEventKind};
use converse_core::controller::Controller;
use converse_core::credentials::{FileCredentialStore, MemoryCredentialStore, StoredCredentials};
use converse_core::errors::ConverseError;
use converse_core::events::{CallEvent, EventStream};
use converse_core::types::{CallState, ConnectionHandle, EngineCallId, RegistrationState};

struct Running {
    controller: Controller,
    sinks: EventSinks,
    engine: Arc<FakeEngine>,
    telephony: Arc<FakeTelephony>,
    host: Arc<FakeHost>,
}

fn controller_with(stored: StoredCredentials) -> Running {
    let engine = Arc::new(FakeEngine::new());
    let telephony = Arc::new(FakeTelephony::new());
    let host = Arc::new(FakeHost::default());
    let store = Arc::new(MemoryCredentialStore::with_stored(stored));

    let (controller, sinks) = Controller::new(
        test_config(),
        engine.clone(),
        telephony.clone(),
        host.clone(),
        store,
    )
    .unwrap();

    Running {
        controller,
        sinks,
        engine,
        telephony,
        host,
    }
}

fn complete() -> StoredCredentials {
    StoredCredentials {
        username: Some("alice".into()),
        password: Some("secret".into()),
        domain: Some("example.com".into()),
    }
}

async fn next_state(stream: &mut EventStream<CallEvent>) -> CallState {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("timed out waiting for a call event")
            .expect("event stream closed");
        if let Some(state) = event.state() {
            return state;
        }
    }
}

#[tokio::test]
async fn test_start_logs_in_with_complete_stored_credentials() {
    let r = controller_with(complete());
    let mut status = r.controller.registration().subscribe();

    r.controller.start().await.unwrap();
    assert!(r.controller.is_running().await);
    assert_eq!(
        r.engine.ops(),
        vec![EngineOp::Login("sip:alice@example.com".into())]
    );

    r.sinks
        .engine
        .registration_event(EngineRegistrationEvent::Ok)
        .await;

    let mut seen = Vec::new();
    while seen.last() != Some(&RegistrationState::Registered) {
        let info = tokio::time::timeout(Duration::from_secs(1), status.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(info.state);
    }
    assert_eq!(
        seen,
        vec![RegistrationState::Registering, RegistrationState::Registered]
    );
    assert_eq!(r.controller.liveness().count(), 0);
    assert_eq!(r.host.transitions(), (1, 1));
}

#[tokio::test]
async fn test_start_without_complete_credentials_stays_logged_out() {
    let partial = StoredCredentials {
        username: Some("alice".into()),
        password: None,
        domain: Some("example.com".into()),
    };
    let r = controller_with(partial);

    r.controller.start().await.unwrap();
    assert!(r.engine.ops().is_empty());
    assert_eq!(
        r.controller.registration().state(),
        RegistrationState::LoggedOut
    );
    assert!(!r.controller.login_from_store().await);
}

#[tokio::test]
async fn test_unreadable_credentials_still_start_logged_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    std::fs::write(&path, "{ not json").unwrap();

    let engine = Arc::new(FakeEngine::new());
    let (controller, sinks) = Controller::new(
        test_config(),
        engine.clone(),
        Arc::new(FakeTelephony::new()),
        Arc::new(FakeHost::default()),
        Arc::new(FileCredentialStore::new(&path)),
    )
    .unwrap();
    let mut calls = controller.bridge().subscribe();

    controller.start().await.unwrap();
    assert!(controller.is_running().await);
    assert!(engine.ops().is_empty());
    assert_eq!(controller.registration().state(), RegistrationState::LoggedOut);

    // Both loops are up and serving adapter callbacks
    sinks
        .engine
        .call_event(
            EngineCallId::new("in-1"),
            EngineCallEvent::IncomingReceived {
                remote: "sip:bob@example.com".into(),
            },
        )
        .await;
    assert_eq!(next_state(&mut calls).await, CallState::Ringing);

    controller.shutdown().await;
    assert!(!controller.is_running().await);
}

#[tokio::test]
async fn test_start_registers_phone_account() {
    let r = controller_with(StoredCredentials::default());
    r.telephony.set_enabled(false);
    r.controller.start().await.unwrap();

    let account = r.controller.phone_account().await.unwrap();
    assert_eq!(account.handle, r.controller.config().phone_account.handle());
    assert_eq!(account.label, "Converse");
    assert!(!account.enabled);
    assert_eq!(
        r.telephony.ops(),
        vec![TelephonyOp::RegisterAccount(account.handle.clone())]
    );
}

#[tokio::test]
async fn test_start_twice_is_an_error() {
    let r = controller_with(StoredCredentials::default());
    r.controller.start().await.unwrap();
    let again = r.controller.start().await;
    assert!(matches!(again, Err(ConverseError::Controller { .. })));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = test_config().with_release_timeout(Duration::ZERO);
    let result = Controller::new(
        config,
        Arc::new(FakeEngine::new()),
        Arc::new(FakeTelephony::new()),
        Arc::new(FakeHost::default()),
        Arc::new(MemoryCredentialStore::new()),
    );
    assert!(matches!(result, Err(ConverseError::Config(_))));
}

#[tokio::test]
async fn test_adapter_callbacks_drive_calls_and_shutdown_winds_down() {
    let r = controller_with(StoredCredentials::default());
    let mut calls = r.controller.bridge().subscribe();
    r.controller.start().await.unwrap();

    r.sinks
        .engine
        .call_event(
            EngineCallId::new("in-1"),
            EngineCallEvent::IncomingReceived {
                remote: "sip:bob@example.com".into(),
            },
        )
        .await;
    assert_eq!(next_state(&mut calls).await, CallState::Ringing);
    assert!(r.controller.liveness().is_foreground());

    r.sinks
        .telephony
        .send(ConnectionHandle(1), TelephonyEventKind::Answer)
        .await;
    assert_eq!(next_state(&mut calls).await, CallState::Active);

    r.controller.shutdown().await;
    assert_eq!(next_state(&mut calls).await, CallState::Disconnecting);
    assert!(!r.controller.is_running().await);
    assert_eq!(r.engine.terminate_count(&EngineCallId::new("in-1")), 1);
    assert_eq!(r.controller.registration().state(), RegistrationState::LoggedOut);
}
