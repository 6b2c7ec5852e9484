use dashmap::DashMap;
use parking_lot::Mutex as SlotMutex;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::state::CallSession;
use crate::types::{ConnectionHandle, EngineCallId, SessionId};

/// Shared handle to one session; the mutex serializes its transitions
pub type SessionHandle = Arc<Mutex<CallSession>>;

/// Session storage with indexes for fast lookup
pub struct SessionStore {
    /// Primary storage - all sessions not yet finalized
    sessions: DashMap<SessionId, SessionHandle>,

    /// Index by engine call ID
    by_engine_call: DashMap<EngineCallId, SessionId>,

    /// Index by telephony connection
    by_connection: DashMap<ConnectionHandle, SessionId>,

    /// The single non-terminal session, if any
    active: SlotMutex<Option<SessionId>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            by_engine_call: DashMap::new(),
            by_connection: DashMap::new(),
            active: SlotMutex::new(None),
        }
    }

    /// Claim the single call slot. Returns the occupant if taken.
    pub fn try_claim_active(&self, session_id: &SessionId) -> Result<(), SessionId> {
        let mut active = self.active.lock();
        match active.as_ref() {
            Some(current) if current != session_id => Err(current.clone()),
            _ => {
                *active = Some(session_id.clone());
                Ok(())
            }
        }
    }

    /// Free the call slot if this session holds it
    pub fn release_active(&self, session_id: &SessionId) {
        let mut active = self.active.lock();
        if active.as_ref() == Some(session_id) {
            *active = None;
            debug!("Call slot released by {}", session_id);
        }
    }

    pub fn active(&self) -> Option<SessionId> {
        self.active.lock().clone()
    }

    pub fn insert(&self, session: CallSession) -> SessionHandle {
        let session_id = session.session_id.clone();
        if let Some(call) = &session.engine_call {
            self.by_engine_call.insert(call.clone(), session_id.clone());
        }
        if let Some(connection) = session.connection {
            self.by_connection.insert(connection, session_id.clone());
        }
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(session_id.clone(), handle.clone());
        info!("Created session {}", session_id);
        handle
    }

    /// Insert a session already locked by the caller, so nothing else can
    /// touch it before its first transition
    pub async fn insert_locked(&self, session: CallSession) -> OwnedMutexGuard<CallSession> {
        let session_id = session.session_id.clone();
        let engine_call = session.engine_call.clone();
        let handle = Arc::new(Mutex::new(session));
        let guard = handle.clone().lock_owned().await;

        if let Some(call) = engine_call {
            self.by_engine_call.insert(call, session_id.clone());
        }
        self.sessions.insert(session_id.clone(), handle);
        info!("Created session {}", session_id);
        guard
    }

    pub fn get(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn index_engine_call(&self, call: EngineCallId, session_id: SessionId) {
        self.by_engine_call.insert(call, session_id);
    }

    pub fn index_connection(&self, connection: ConnectionHandle, session_id: SessionId) {
        self.by_connection.insert(connection, session_id);
    }

    pub fn find_by_engine_call(&self, call: &EngineCallId) -> Option<SessionId> {
        self.by_engine_call.get(call).map(|entry| entry.value().clone())
    }

    pub fn find_by_connection(&self, connection: &ConnectionHandle) -> Option<SessionId> {
        self.by_connection.get(connection).map(|entry| entry.value().clone())
    }

    /// Drop a session and every index pointing at it
    pub fn remove(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        self.by_engine_call.retain(|_, id| id != session_id);
        self.by_connection.retain(|_, id| id != session_id);
        self.release_active(session_id);
        if removed {
            info!("Removed session {}", session_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }
}
