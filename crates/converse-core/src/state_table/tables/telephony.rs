use crate::state_table::{Action, EventTemplate, EventType, Guard, Role, StateTableBuilder, Transition};
use crate::types::{CallState, DisconnectCause};

/// Rows driven by telephony subsystem requests
pub fn add_telephony_transitions(builder: &mut StateTableBuilder) {
    // Ringing -> Active: user answered; Active is shown before the engine confirms
    builder.add_transition(
        Role::Inbound,
        CallState::Ringing,
        EventType::Answer,
        Transition {
            guards: vec![Guard::HasConnection],
            actions: vec![Action::SetConnectionActive, Action::EngineAccept],
            next_state: Some(CallState::Active),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // Ringing -> Terminated(Rejected)
    builder.add_transition(
        Role::Inbound,
        CallState::Ringing,
        EventType::Reject,
        Transition {
            guards: vec![],
            actions: vec![
                Action::EngineTerminate,
                Action::ReleaseConnection(DisconnectCause::Rejected),
            ],
            next_state: Some(CallState::Terminated(DisconnectCause::Rejected)),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // Any live state -> Terminated(Local): user hung up
    builder.add_wildcard(
        Role::Both,
        EventType::Disconnect,
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

    // Active -> OnHold
    builder.add_transition(
        Role::Both,
        CallState::Active,
        EventType::Hold,
        Transition {
            guards: vec![Guard::HasEngineCall],
            actions: vec![Action::EngineHold],
            next_state: Some(CallState::OnHold),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // OnHold -> Active
    builder.add_transition(
        Role::Both,
        CallState::OnHold,
        EventType::Unhold,
        Transition {
            guards: vec![Guard::HasEngineCall],
            actions: vec![Action::EngineResume],
            next_state: Some(CallState::Active),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );

    // Mute toggles the engine microphone only
    builder.add_wildcard(
        Role::Both,
        EventType::MuteChanged { muted: false },
        Transition {
            guards: vec![],
            actions: vec![Action::EngineSetMic, Action::RecordMute],
            next_state: None,
            publish_events: vec![EventTemplate::MuteChanged],
        },
    );

    builder.add_transition(
        Role::Both,
        CallState::Active,
        EventType::PlayDtmf { digit: '0' },
        Transition {
            guards: vec![Guard::HasEngineCall],
            actions: vec![Action::EngineSendDtmf],
            next_state: None,
            publish_events: vec![],
        },
    );
}
