//! Outbound dialing through the bridge

mod common;

use common::*;
use pretty_assertions::assert_eq;

use converse_core::adapters::{EngineCallEvent, TelephonyEventKind};
use converse_core::errors::{
    AdapterError, CallRuntimeError, CallSetupError, ConverseError, EngineError,
};
use converse_core::events::CallEvent;
use converse_core::types::{CallDirection, CallState, ConnectionHandle, DisconnectCause, EngineCallId};

const CONN: ConnectionHandle = ConnectionHandle(1);

fn out_call() -> EngineCallId {
    EngineCallId::new("out-1")
}

/// The only StateChanged published for a refused dial
fn refused(events: &[CallEvent]) -> (Option<CallState>, CallState, Option<String>) {
    let changes: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            CallEvent::StateChanged(info) => Some(info.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(changes.len(), 1, "expected a single state change, got {:?}", changes);
    let info = &changes[0];
    assert_eq!(info.direction, CallDirection::Outbound);
    (info.previous_state, info.new_state, info.reason.clone())
}

#[tokio::test]
async fn test_dial_connect_and_remote_hangup() {
    let mut h = Harness::new().registered().await;

    let call = h.bridge.dial("555-0100").await.unwrap();
    assert_eq!(call.state, CallState::Dialing);
    assert_eq!(call.remote.to_string(), "sip:5550100@pbx.example.net");
    assert_eq!(call.engine_call, Some(out_call()));
    assert_eq!(call.connection, Some(CONN));
    let session = call.session_id;

    h.engine("out-1", EngineCallEvent::OutgoingInit).await.unwrap();
    h.engine("out-1", EngineCallEvent::OutgoingRinging).await.unwrap();
    assert_eq!(h.bridge.call(&session).await.unwrap().state, CallState::Dialing);

    h.engine("out-1", EngineCallEvent::Connected).await.unwrap();
    h.engine("out-1", EngineCallEvent::End).await.unwrap();
    h.engine("out-1", EngineCallEvent::Released).await.unwrap();

    assert_eq!(
        h.telephony.ops(),
        vec![
            TelephonyOp::PlaceOutgoing(CONN, "sip:5550100@pbx.example.net".into()),
            TelephonyOp::SetDialing(CONN),
            TelephonyOp::SetDialing(CONN),
            TelephonyOp::SetActive(CONN),
            TelephonyOp::SetDisconnected(CONN, DisconnectCause::Local),
        ]
    );
    assert_eq!(h.engine.terminate_count(&out_call()), 0);

    let events = h.drain();
    assert_eq!(
        states_for(&events, &session),
        vec![
            CallState::Dialing,
            CallState::Active,
            CallState::Terminated(DisconnectCause::Local),
        ]
    );
    assert!(finalized(&events, &session));
    assert_eq!(h.liveness.count(), 0);
}

#[tokio::test]
async fn test_invalid_address_never_rings() {
    let mut h = Harness::new().registered().await;

    let result = h.bridge.dial("sip:bob@exa mple.com").await;
    assert!(matches!(
        result,
        Err(ConverseError::CallSetup(CallSetupError::InvalidAddress { .. }))
    ));

    let (previous, state, reason) = refused(&h.drain());
    assert_eq!(previous, None);
    assert_eq!(state, CallState::Terminated(DisconnectCause::Error));
    assert!(reason.is_some());

    assert!(h.telephony.ops().is_empty());
    assert_eq!(h.engine.count(|op| matches!(op, EngineOp::PlaceCall(_))), 0);
    assert_eq!(h.bridge.active_count(), 0);
    assert_eq!(h.liveness.count(), 0);
}

#[tokio::test]
async fn test_engine_refusing_the_call_goes_straight_to_error() {
    let mut h = Harness::new().registered().await;
    *h.engine.fail_place_call.lock() = Some(EngineError::rejected("place_call", "no route"));

    let result = h.bridge.dial("1001").await;
    assert!(matches!(
        result,
        Err(ConverseError::CallSetup(CallSetupError::Engine(_)))
    ));

    let events = h.drain();
    let (previous, state, _) = refused(&events);
    assert_eq!(previous, None);
    assert_eq!(state, CallState::Terminated(DisconnectCause::Error));
    assert!(events.iter().any(|e| matches!(e, CallEvent::Finalized { .. })));

    assert_eq!(h.telephony.disconnects(), vec![(CONN, DisconnectCause::Error)]);
    assert_eq!(h.bridge.active_count(), 0);
    assert_eq!(h.liveness.count(), 0);
}

#[tokio::test]
async fn test_disconnect_before_connected_terminates_once() {
    let mut h = Harness::new().registered().await;
    let session = h.bridge.dial("1001").await.unwrap().session_id;

    h.telephony(CONN, TelephonyEventKind::Disconnect).await.unwrap();
    assert_eq!(h.engine.terminate_count(&out_call()), 1);

    // Engine answer for the abandoned call arrives late
    let late = h.engine("out-1", EngineCallEvent::Connected).await;
    assert!(matches!(
        late,
        Err(ConverseError::CallRuntime(CallRuntimeError::AlreadyTerminated { .. }))
    ));
    h.bridge.hangup(&session).await.unwrap();
    h.engine("out-1", EngineCallEvent::End).await.unwrap();
    h.engine("out-1", EngineCallEvent::Released).await.unwrap();

    assert_eq!(h.engine.terminate_count(&out_call()), 1);
    assert_eq!(h.telephony.disconnects(), vec![(CONN, DisconnectCause::Local)]);
    assert_eq!(h.telephony.count(|op| matches!(op, TelephonyOp::SetActive(_))), 0);

    let events = h.drain();
    assert_eq!(
        states_for(&events, &session),
        vec![CallState::Dialing, CallState::Terminated(DisconnectCause::Local)]
    );
    assert!(finalized(&events, &session));
}

#[tokio::test]
async fn test_local_hangup_is_idempotent() {
    let mut h = Harness::new().registered().await;
    let session = h.bridge.dial("1001").await.unwrap().session_id;
    h.engine("out-1", EngineCallEvent::Connected).await.unwrap();

    h.bridge.hangup(&session).await.unwrap();
    h.bridge.hangup(&session).await.unwrap();
    assert_eq!(h.engine.terminate_count(&out_call()), 1);

    h.engine("out-1", EngineCallEvent::Released).await.unwrap();
    let missing = h.bridge.hangup(&session).await;
    assert!(matches!(
        missing,
        Err(ConverseError::CallRuntime(CallRuntimeError::SessionNotFound { .. }))
    ));

    let events = h.drain();
    assert_eq!(
        states_for(&events, &session),
        vec![
            CallState::Dialing,
            CallState::Active,
            CallState::Terminated(DisconnectCause::Local),
        ]
    );
}

#[tokio::test]
async fn test_engine_error_mid_call() {
    let mut h = Harness::new().registered().await;
    let session = h.bridge.dial("1001").await.unwrap().session_id;
    h.engine("out-1", EngineCallEvent::Connected).await.unwrap();

    h.engine(
        "out-1",
        EngineCallEvent::Error {
            message: "488 Not Acceptable Here".into(),
        },
    )
    .await
    .unwrap();

    assert_eq!(h.engine.terminate_count(&out_call()), 1);
    assert_eq!(h.telephony.disconnects(), vec![(CONN, DisconnectCause::Error)]);

    let events = h.drain();
    let last = events
        .iter()
        .rev()
        .find_map(|e| match e {
            CallEvent::StateChanged(info) => Some(info.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last.new_state, CallState::Terminated(DisconnectCause::Error));
    assert_eq!(last.previous_state, Some(CallState::Active));
    assert_eq!(last.reason.as_deref(), Some("488 Not Acceptable Here"));
    assert_eq!(
        states_for(&events, &session),
        vec![
            CallState::Dialing,
            CallState::Active,
            CallState::Terminated(DisconnectCause::Error),
        ]
    );
}

#[tokio::test]
async fn test_dial_requires_registration() {
    let mut h = Harness::new();

    let result = h.bridge.dial("1001").await;
    assert!(matches!(
        result,
        Err(ConverseError::CallSetup(CallSetupError::AccountMissing { .. }))
    ));
    let (_, state, _) = refused(&h.drain());
    assert_eq!(state, CallState::Terminated(DisconnectCause::Error));
    assert!(h.telephony.ops().is_empty());
}

#[tokio::test]
async fn test_dial_requires_ready_engine() {
    let mut h = Harness::new().registered().await;
    h.engine.set_ready(false);

    let result = h.bridge.dial("1001").await;
    assert!(matches!(
        result,
        Err(ConverseError::CallSetup(CallSetupError::EngineNotReady))
    ));
    let _ = refused(&h.drain());
    assert_eq!(h.engine.count(|op| matches!(op, EngineOp::PlaceCall(_))), 0);
}

#[tokio::test]
async fn test_dial_with_disabled_account_requests_enablement() {
    let mut h = Harness::new().registered().await;
    h.telephony.set_enabled(false);

    let result = h.bridge.dial("1001").await;
    assert!(matches!(
        result,
        Err(ConverseError::Adapter(AdapterError::AccountDisabled { .. }))
    ));
    assert_eq!(h.telephony.ops(), vec![TelephonyOp::RequestEnable]);
    let _ = refused(&h.drain());
}

#[tokio::test]
async fn test_second_dial_is_busy() {
    let mut h = Harness::new().registered().await;
    let first = h.bridge.dial("1001").await.unwrap().session_id;
    let _ = h.drain();

    match h.bridge.dial("1002").await {
        Err(ConverseError::CallSetup(CallSetupError::Busy { active })) => assert_eq!(active, first),
        other => panic!("expected Busy, got {:?}", other.map(|c| c.session_id)),
    }
    let (_, state, _) = refused(&h.drain());
    assert_eq!(state, CallState::Terminated(DisconnectCause::Error));
    assert_eq!(h.engine.count(|op| matches!(op, EngineOp::PlaceCall(_))), 1);
    assert_eq!(h.bridge.current_call().await.unwrap().session_id, first);
}

#[tokio::test]
async fn test_foreign_engine_call_is_not_applied() {
    let mut h = Harness::new().registered().await;
    let session = h.bridge.dial("1001").await.unwrap().session_id;

    let result = h.engine("someone-else", EngineCallEvent::Connected).await;
    assert!(matches!(
        result,
        Err(ConverseError::CallRuntime(CallRuntimeError::SessionNotFound { .. }))
    ));
    assert_eq!(h.bridge.call(&session).await.unwrap().state, CallState::Dialing);
    assert_eq!(states_for(&h.drain(), &session), vec![CallState::Dialing]);
}

#[tokio::test]
async fn test_shutdown_moves_live_calls_to_disconnecting() {
    let mut h = Harness::new().registered().await;
    let session = h.bridge.dial("1001").await.unwrap().session_id;
    h.engine("out-1", EngineCallEvent::Connected).await.unwrap();

    h.bridge.shutdown().await;
    assert_eq!(h.bridge.call(&session).await.unwrap().state, CallState::Disconnecting);
    assert_eq!(h.engine.terminate_count(&out_call()), 1);
    // Connection stays up until the engine confirms
    assert!(h.telephony.disconnects().is_empty());

    h.bridge.shutdown().await;
    assert_eq!(h.engine.terminate_count(&out_call()), 1);

    h.engine("out-1", EngineCallEvent::End).await.unwrap();
    assert_eq!(h.telephony.disconnects(), vec![(CONN, DisconnectCause::Local)]);
    h.engine("out-1", EngineCallEvent::Released).await.unwrap();

    let events = h.drain();
    assert_eq!(
        states_for(&events, &session),
        vec![
            CallState::Dialing,
            CallState::Active,
            CallState::Disconnecting,
            CallState::Terminated(DisconnectCause::Local),
        ]
    );
    assert!(finalized(&events, &session));
}
