use crate::state_table::{Action, EventTemplate, EventType, Guard, Role, StateTableBuilder, Transition};
use crate::types::{CallState, DisconnectCause};

/// Rows driven by the bridge itself: dialing, enablement, app requests and teardown
pub fn add_internal_transitions(builder: &mut StateTableBuilder) {
    // Dialing: the target was validated, make the call visible and dial
    builder.add_transition(
        Role::Outbound,
        CallState::Dialing,
        EventType::Dial,
        Transition {
            guards: vec![],
            actions: vec![
                Action::CreateOutgoingConnection,
                Action::SetConnectionDialing,
                Action::EnginePlaceCall,
            ],
            next_state: None,
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // Ringing: incoming call while the phone account is disabled
    builder.add_transition(
        Role::Inbound,
        CallState::Ringing,
        EventType::EnablementRequired,
        Transition {
            guards: vec![],
            actions: vec![Action::RequestAccountEnablement, Action::WatchEnablement],
            next_state: None,
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    builder.add_transition(
        Role::Inbound,
        CallState::Ringing,
        EventType::EnablementGranted,
        Transition {
            guards: vec![Guard::AwaitingEnablement],
            actions: vec![Action::CreateIncomingConnection, Action::SetConnectionRinging],
            next_state: None,
            publish_events: vec![],
        },
    );

    // Ringing -> Terminated(Error): the account was never enabled
    builder.add_transition(
        Role::Inbound,
        CallState::Ringing,
        EventType::EnablementTimedOut,
        Transition {
            guards: vec![Guard::AwaitingEnablement],
            actions: vec![
                Action::EngineTerminate,
                Action::ReleaseConnection(DisconnectCause::Error),
            ],
            next_state: Some(CallState::Terminated(DisconnectCause::Error)),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // App-driven hangup behaves like a telephony disconnect
    builder.add_wildcard(
        Role::Both,
        EventType::Hangup,
        Transition {
            guards: vec![],
            actions: vec![
                Action::EngineTerminate,
                Action::ReleaseConnection(DisconnectCause::Local),
            ],
            next_state: Some(CallState::Terminated(DisconnectCause::Local)),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // App-driven mute also updates the telephony view
    builder.add_wildcard(
        Role::Both,
        EventType::LocalMute { muted: false },
        Transition {
            guards: vec![],
            actions: vec![Action::EngineSetMic, Action::SetConnectionMuted, Action::RecordMute],
            next_state: None,
            publish_events: vec![EventTemplate::MuteChanged],
        },
    );

    // Any live state -> Disconnecting: process is shutting down
    builder.add_wildcard(
        Role::Both,
        EventType::Shutdown,
        Transition {
            guards: vec![],
            actions: vec![Action::EngineTerminate, Action::ArmReleaseTimer],
            next_state: Some(CallState::Disconnecting),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    builder.add_transition(
        Role::Both,
        CallState::Disconnecting,
        EventType::Shutdown,
        Transition {
            guards: vec![],
            actions: vec![],
            next_state: None,
            publish_events: vec![],
        },
    );

    // Disconnecting -> Terminated(Local): the engine never confirmed the end
    builder.add_transition(
        Role::Both,
        CallState::Disconnecting,
        EventType::ReleaseTimedOut,
        Transition {
            guards: vec![],
            actions: vec![
                Action::MarkReleaseWaitExpired,
                Action::ReleaseConnection(DisconnectCause::Local),
            ],
            next_state: Some(CallState::Terminated(DisconnectCause::Local)),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // Terminated: stop waiting for the engine to release the call
    for state in CallState::terminal_states() {
        builder.add_transition(
            Role::Both,
            state,
            EventType::ReleaseTimedOut,
            Transition {
                guards: vec![],
                actions: vec![Action::MarkReleaseWaitExpired],
                next_state: None,
                publish_events: vec![],
            },
        );
    }
}
