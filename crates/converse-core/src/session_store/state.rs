use chrono::{DateTime, Utc};

use crate::address::SipAddress;
use crate::liveness::LivenessGuard;
use crate::types::{
    CallDirection, CallInfo, CallState, ConnectionHandle, EngineCallId, MediaEncryption, SessionId,
};

/// Live record of one call, owned by the bridge.
///
/// Only the state machine mutates it, always under the session lock.
#[derive(Debug)]
pub struct CallSession {
    pub session_id: SessionId,
    pub direction: CallDirection,
    pub remote: SipAddress,
    pub state: CallState,
    pub muted: bool,
    pub encryption: MediaEncryption,

    pub engine_call: Option<EngineCallId>,
    pub connection: Option<ConnectionHandle>,

    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Observers have seen at least one state for this session
    pub announced: bool,
    pub awaiting_enablement: bool,
    pub connection_released: bool,
    pub engine_terminate_sent: bool,
    pub engine_ended: bool,
    pub engine_released: bool,
    pub release_timer_armed: bool,
    pub release_wait_expired: bool,
    pub finalized: bool,

    /// Keeps the host in the foreground until the session is finalized
    pub liveness: Option<LivenessGuard>,
}

impl CallSession {
    pub fn new(
        session_id: SessionId,
        direction: CallDirection,
        remote: SipAddress,
        encryption: MediaEncryption,
    ) -> Self {
        let state = match direction {
            CallDirection::Inbound => CallState::Ringing,
            CallDirection::Outbound => CallState::Dialing,
        };
        Self {
            session_id,
            direction,
            remote,
            state,
            muted: false,
            encryption,
            engine_call: None,
            connection: None,
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
            announced: false,
            awaiting_enablement: false,
            connection_released: false,
            engine_terminate_sent: false,
            engine_ended: false,
            engine_released: false,
            release_timer_armed: false,
            release_wait_expired: false,
            finalized: false,
            liveness: None,
        }
    }

    pub fn with_engine_call(mut self, call: EngineCallId) -> Self {
        self.engine_call = Some(call);
        self
    }

    pub fn with_liveness(mut self, guard: LivenessGuard) -> Self {
        self.liveness = Some(guard);
        self
    }

    /// The engine still holds the call and has not ended it
    pub fn engine_live(&self) -> bool {
        self.engine_call.is_some() && !self.engine_ended && !self.engine_released
    }

    /// Both sides are done with the call
    pub fn ready_to_finalize(&self) -> bool {
        self.state.is_terminal()
            && (self.engine_call.is_none() || self.engine_released || self.release_wait_expired)
    }

    pub fn info(&self) -> CallInfo {
        CallInfo {
            session_id: self.session_id.clone(),
            direction: self.direction,
            remote: self.remote.clone(),
            state: self.state,
            muted: self.muted,
            encryption: self.encryption,
            engine_call: self.engine_call.clone(),
            connection: self.connection,
            created_at: self.created_at,
            connected_at: self.connected_at,
            ended_at: self.ended_at,
        }
    }
}
