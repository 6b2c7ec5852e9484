use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::adapters::{EngineCallEvent, TelephonyEventKind};
use crate::types::{CallDirection, CallState, DisconnectCause};

/// Key for looking up transitions in the state table
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct StateKey {
    pub role: Role,
    pub state: CallState,
    pub event: EventType,
}

/// Which calls a row applies to
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Inbound,
    Outbound,
    /// Applies to both directions
    Both,
}

impl From<CallDirection> for Role {
    fn from(direction: CallDirection) -> Self {
        match direction {
            CallDirection::Inbound => Role::Inbound,
            CallDirection::Outbound => Role::Outbound,
        }
    }
}

/// Event types that trigger transitions
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventType {
    // Engine events
    IncomingReceived,
    OutgoingInit,
    OutgoingProgress,
    OutgoingRinging,
    Connected,
    End,
    EngineError { message: String },
    Released,

    // Telephony events
    Answer,
    Reject,
    Disconnect,
    Hold,
    Unhold,
    MuteChanged { muted: bool },
    PlayDtmf { digit: char },

    // Internal events
    Dial,
    EnablementRequired,
    EnablementGranted,
    EnablementTimedOut,
    ReleaseTimedOut,
    Shutdown,
    Hangup,
    LocalMute { muted: bool },
}

impl EventType {
    /// Variant name without parameter values
    pub fn type_name(&self) -> &'static str {
        match self {
            EventType::IncomingReceived => "IncomingReceived",
            EventType::OutgoingInit => "OutgoingInit",
            EventType::OutgoingProgress => "OutgoingProgress",
            EventType::OutgoingRinging => "OutgoingRinging",
            EventType::Connected => "Connected",
            EventType::End => "End",
            EventType::EngineError { .. } => "EngineError",
            EventType::Released => "Released",

            EventType::Answer => "Answer",
            EventType::Reject => "Reject",
            EventType::Disconnect => "Disconnect",
            EventType::Hold => "Hold",
            EventType::Unhold => "Unhold",
            EventType::MuteChanged { .. } => "MuteChanged",
            EventType::PlayDtmf { .. } => "PlayDtmf",

            EventType::Dial => "Dial",
            EventType::EnablementRequired => "EnablementRequired",
            EventType::EnablementGranted => "EnablementGranted",
            EventType::EnablementTimedOut => "EnablementTimedOut",
            EventType::ReleaseTimedOut => "ReleaseTimedOut",
            EventType::Shutdown => "Shutdown",
            EventType::Hangup => "Hangup",
            EventType::LocalMute { .. } => "LocalMute",
        }
    }

    /// Strip runtime values so lookups match on the event type only
    pub fn normalize(&self) -> Self {
        match self {
            EventType::EngineError { .. } => EventType::EngineError { message: String::new() },
            EventType::MuteChanged { .. } => EventType::MuteChanged { muted: false },
            EventType::PlayDtmf { .. } => EventType::PlayDtmf { digit: '0' },
            EventType::LocalMute { .. } => EventType::LocalMute { muted: false },
            _ => self.clone(),
        }
    }
}

impl From<EngineCallEvent> for EventType {
    fn from(event: EngineCallEvent) -> Self {
        match event {
            EngineCallEvent::IncomingReceived { .. } => EventType::IncomingReceived,
            EngineCallEvent::OutgoingInit => EventType::OutgoingInit,
            EngineCallEvent::OutgoingProgress => EventType::OutgoingProgress,
            EngineCallEvent::OutgoingRinging => EventType::OutgoingRinging,
            EngineCallEvent::Connected => EventType::Connected,
            EngineCallEvent::End => EventType::End,
            EngineCallEvent::Error { message } => EventType::EngineError { message },
            EngineCallEvent::Released => EventType::Released,
        }
    }
}

impl From<TelephonyEventKind> for EventType {
    fn from(kind: TelephonyEventKind) -> Self {
        match kind {
            TelephonyEventKind::Answer => EventType::Answer,
            TelephonyEventKind::Reject => EventType::Reject,
            TelephonyEventKind::Disconnect => EventType::Disconnect,
            TelephonyEventKind::Hold => EventType::Hold,
            TelephonyEventKind::Unhold => EventType::Unhold,
            TelephonyEventKind::MuteChanged { muted } => EventType::MuteChanged { muted },
            TelephonyEventKind::PlayDtmf { digit } => EventType::PlayDtmf { digit },
        }
    }
}

/// Transition definition - what happens when an event occurs in a state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Conditions that must be true for this transition
    pub guards: Vec<Guard>,

    /// Actions to execute, in order
    pub actions: Vec<Action>,

    /// Next state (if changing)
    pub next_state: Option<CallState>,

    /// Events to publish after the transition
    pub publish_events: Vec<EventTemplate>,
}

/// Guards that must be satisfied for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Guard {
    /// Incoming call waiting for the phone account to be enabled
    AwaitingEnablement,
    /// A telephony connection is bound to the session
    HasConnection,
    /// The engine knows the call
    HasEngineCall,
}

/// Actions to execute during a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    // Telephony actions
    CreateIncomingConnection,
    CreateOutgoingConnection,
    SetConnectionRinging,
    SetConnectionDialing,
    SetConnectionActive,
    SetConnectionMuted,
    RequestAccountEnablement,
    /// Poll for enablement until granted or timed out
    WatchEnablement,
    /// Disconnect and release the connection, at most once
    ReleaseConnection(DisconnectCause),

    // Engine actions
    EnginePlaceCall,
    EngineAccept,
    /// Terminate the engine call, at most once
    EngineTerminate,
    EngineHold,
    EngineResume,
    EngineSetMic,
    EngineSendDtmf,

    // Bookkeeping
    RecordMute,
    MarkEngineConnected,
    MarkEngineEnded,
    MarkEngineReleased,
    MarkReleaseWaitExpired,
    ArmReleaseTimer,
}

/// Event templates for publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTemplate {
    StateChanged,
    MuteChanged,
}

/// Master state table containing all transitions
pub struct MasterStateTable {
    transitions: HashMap<StateKey, Transition>,
    /// Rows that apply to every non-terminal state
    wildcard_transitions: HashMap<(Role, EventType), Transition>,
}

impl MasterStateTable {
    pub fn new() -> Self {
        Self {
            transitions: HashMap::new(),
            wildcard_transitions: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: StateKey, transition: Transition) {
        let normalized_key = StateKey {
            role: key.role,
            state: key.state,
            event: key.event.normalize(),
        };
        self.transitions.insert(normalized_key, transition);
    }

    pub fn insert_wildcard(&mut self, role: Role, event: EventType, transition: Transition) {
        self.wildcard_transitions.insert((role, event.normalize()), transition);
    }

    /// Find the row for an event.
    ///
    /// Exact rows win over wildcard rows and role-specific rows win over
    /// `Role::Both`. Terminated states never match wildcards.
    pub fn get(&self, role: Role, state: CallState, event: &EventType) -> Option<&Transition> {
        let event = event.normalize();

        for r in [role, Role::Both] {
            let key = StateKey {
                role: r,
                state,
                event: event.clone(),
            };
            if let Some(transition) = self.transitions.get(&key) {
                return Some(transition);
            }
        }

        if state.is_terminal() {
            return None;
        }

        for r in [role, Role::Both] {
            if let Some(transition) = self.wildcard_transitions.get(&(r, event.clone())) {
                return Some(transition);
            }
        }
        None
    }

    pub fn has_transition(&self, role: Role, state: CallState, event: &EventType) -> bool {
        self.get(role, state, event).is_some()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len() + self.wildcard_transitions.len()
    }

    /// Collect all states referenced in this table
    pub fn collect_used_states(&self) -> HashSet<CallState> {
        let mut states = HashSet::new();

        for (key, transition) in &self.transitions {
            states.insert(key.state);
            if let Some(next_state) = transition.next_state {
                states.insert(next_state);
            }
        }
        for transition in self.wildcard_transitions.values() {
            if let Some(next_state) = transition.next_state {
                states.insert(next_state);
            }
        }

        states
    }

    fn all_rows(&self) -> impl Iterator<Item = (Option<CallState>, &EventType, &Transition)> {
        self.transitions
            .iter()
            .map(|(k, t)| (Some(k.state), &k.event, t))
            .chain(self.wildcard_transitions.iter().map(|((_, e), t)| (None, e, t)))
    }

    /// Check the table's structural rules:
    /// - every non-terminal state in use can be left
    /// - terminated states have no way out
    /// - every row entering `Terminated(cause)` releases the connection with that cause
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for state in self.collect_used_states() {
            if state.is_terminal() {
                continue;
            }
            let leaves = |t: &Transition| t.next_state.is_some_and(|next| next != state);
            let has_exact_exit = self
                .transitions
                .iter()
                .any(|(k, t)| k.state == state && leaves(t));
            let has_wildcard_exit = self.wildcard_transitions.values().any(|t| leaves(t));
            if !has_exact_exit && !has_wildcard_exit {
                errors.push(format!("State {:?} has no exit transitions", state));
            }
        }

        for (key, transition) in &self.transitions {
            if key.state.is_terminal() && transition.next_state.is_some() {
                errors.push(format!(
                    "Terminal state {:?} has an exit on {}",
                    key.state,
                    key.event.type_name()
                ));
            }
        }

        for (state, event, transition) in self.all_rows() {
            if let Some(CallState::Terminated(cause)) = transition.next_state {
                if state.is_some_and(|s| s.is_terminal()) {
                    continue;
                }
                if !transition.actions.contains(&Action::ReleaseConnection(cause)) {
                    errors.push(format!(
                        "{} from {:?} terminates without releasing the connection as {:?}",
                        event.type_name(),
                        state,
                        cause
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
