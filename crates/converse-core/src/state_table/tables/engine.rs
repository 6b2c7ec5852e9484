use crate::state_table::{Action, EventTemplate, EventType, Guard, Role, StateTableBuilder, Transition};
use crate::types::{CallState, DisconnectCause};

/// Rows driven by SIP engine call events
pub fn add_engine_transitions(builder: &mut StateTableBuilder) {
    // Ringing: incoming call with the phone account enabled
    builder.add_transition(
        Role::Inbound,
        CallState::Ringing,
        EventType::IncomingReceived,
        Transition {
            guards: vec![],
            actions: vec![Action::CreateIncomingConnection, Action::SetConnectionRinging],
            next_state: None,
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // Dialing: the engine picked up the call we created at dial time
    builder.add_transition(
        Role::Outbound,
        CallState::Dialing,
        EventType::OutgoingInit,
        Transition {
            guards: vec![Guard::HasConnection],
            actions: vec![Action::SetConnectionDialing],
            next_state: None,
            publish_events: vec![],
        },
    );

    // Dialing: remote progress keeps the connection dialing until answered
    for event in [EventType::OutgoingProgress, EventType::OutgoingRinging] {
        builder.add_transition(
            Role::Outbound,
            CallState::Dialing,
            event,
            Transition {
                guards: vec![],
                actions: vec![],
                next_state: None,
                publish_events: vec![],
            },
        );
    }

    // Dialing -> Active: remote answered
    builder.add_transition(
        Role::Outbound,
        CallState::Dialing,
        EventType::Connected,
        Transition {
            guards: vec![Guard::HasConnection],
            actions: vec![Action::MarkEngineConnected, Action::SetConnectionActive],
            next_state: Some(CallState::Active),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // Ringing -> Active: engine connected before the user answered locally
    builder.add_transition(
        Role::Inbound,
        CallState::Ringing,
        EventType::Connected,
        Transition {
            guards: vec![Guard::HasConnection],
            actions: vec![Action::MarkEngineConnected, Action::SetConnectionActive],
            next_state: Some(CallState::Active),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // Active/OnHold: Connected confirms an optimistic answer or a resume,
    // the telephony side already reflects it
    for state in [CallState::Active, CallState::OnHold] {
        builder.add_transition(
            Role::Both,
            state,
            EventType::Connected,
            Transition {
                guards: vec![],
                actions: vec![Action::MarkEngineConnected],
                next_state: None,
                publish_events: vec![],
            },
        );
    }

    // Any live state -> Terminated(Local): remote or engine ended the call
    builder.add_wildcard(
        Role::Both,
        EventType::End,
        Transition {
            guards: vec![],
            actions: vec![
                Action::MarkEngineEnded,
                Action::ReleaseConnection(DisconnectCause::Local),
            ],
            next_state: Some(CallState::Terminated(DisconnectCause::Local)),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // Any live state -> Terminated(Error): engine reported a call error
    builder.add_wildcard(
        Role::Both,
        EventType::EngineError { message: String::new() },
        Transition {
            guards: vec![],
            actions: vec![
                Action::EngineTerminate,
                Action::ReleaseConnection(DisconnectCause::Error),
            ],
            next_state: Some(CallState::Terminated(DisconnectCause::Error)),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // Any live state -> Terminated(Error): engine dropped the call without ending it
    builder.add_wildcard(
        Role::Both,
        EventType::Released,
        Transition {
            guards: vec![],
            actions: vec![
                Action::MarkEngineReleased,
                Action::ReleaseConnection(DisconnectCause::Error),
            ],
            next_state: Some(CallState::Terminated(DisconnectCause::Error)),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // Terminated: engine teardown bookkeeping only
    for state in CallState::terminal_states() {
        builder.add_transition(
            Role::Both,
            state,
            EventType::End,
            Transition {
                guards: vec![],
                actions: vec![Action::MarkEngineEnded],
                next_state: None,
                publish_events: vec![],
            },
        );
        builder.add_transition(
            Role::Both,
            state,
            EventType::Released,
            Transition {
                guards: vec![],
                actions: vec![Action::MarkEngineReleased],
                next_state: None,
                publish_events: vec![],
            },
        );
    }
}
