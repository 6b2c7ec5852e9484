use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::actions::{execute_action, ActionError};
use super::guards::check_guards;
use crate::adapters::{ConnectionOptions, SipEngine, Telephony};
use crate::errors::{CallRuntimeError, CallSetupError, ConverseError, Result};
use crate::events::{CallEvent, CallStatusInfo, EventBus};
use crate::session_store::{CallSession, SessionStore};
use crate::state_table::{Action, EventTemplate, EventType, MasterStateTable, Role};
use crate::types::{CallState, DisconnectCause, EngineCallId, PhoneAccountHandle, SessionId};

/// Timing and identity settings the state machine needs at runtime
#[derive(Debug, Clone)]
pub struct MachineSettings {
    pub phone_account: PhoneAccountHandle,
    pub connection_options: ConnectionOptions,
    pub enablement_timeout: Duration,
    pub enablement_poll_interval: Duration,
    pub release_timeout: Duration,
}

/// Outcome of processing one event
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEventResult {
    pub session_id: SessionId,
    pub old_state: CallState,
    pub next_state: CallState,
    /// False when a guard blocked the row
    pub transition_applied: bool,
    pub actions_executed: Vec<Action>,
    pub finalized: bool,
}

/// Applies state table rows to sessions.
///
/// Each event is processed while holding the session's lock, from the table
/// lookup through every adapter call to the published state change, so two
/// events for one session can never interleave mid-transition.
pub struct StateMachine {
    table: Arc<MasterStateTable>,
    store: Arc<SessionStore>,
    engine: Arc<dyn SipEngine>,
    telephony: Arc<dyn Telephony>,
    events: EventBus<CallEvent>,
    settings: MachineSettings,
}

impl StateMachine {
    pub fn new(
        table: Arc<MasterStateTable>,
        store: Arc<SessionStore>,
        engine: Arc<dyn SipEngine>,
        telephony: Arc<dyn Telephony>,
        events: EventBus<CallEvent>,
        settings: MachineSettings,
    ) -> Self {
        Self {
            table,
            store,
            engine,
            telephony,
            events,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<dyn SipEngine> {
        &self.engine
    }

    pub fn telephony(&self) -> &Arc<dyn Telephony> {
        &self.telephony
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus<CallEvent> {
        &self.events
    }

    /// Process an event for a session
    pub async fn process_event(
        self: &Arc<Self>,
        session_id: &SessionId,
        event: EventType,
    ) -> Result<ProcessEventResult> {
        let handle = self
            .store
            .get(session_id)
            .ok_or_else(|| CallRuntimeError::SessionNotFound {
                session: session_id.clone(),
            })?;
        let mut session = handle.lock().await;
        self.apply(&mut session, event).await
    }

    /// Process an engine event, checking the session still owns the engine call
    pub async fn process_engine_event(
        self: &Arc<Self>,
        session_id: &SessionId,
        call: &EngineCallId,
        event: EventType,
    ) -> Result<ProcessEventResult> {
        let handle = self
            .store
            .get(session_id)
            .ok_or_else(|| CallRuntimeError::SessionNotFound {
                session: session_id.clone(),
            })?;
        let mut session = handle.lock().await;
        if session.engine_call.as_ref() != Some(call) {
            debug!(
                "Engine call {} does not belong to {}, dropping {}",
                call,
                session_id,
                event.type_name()
            );
            return Err(CallRuntimeError::SessionNotFound {
                session: session_id.clone(),
            }
            .into());
        }
        self.apply(&mut session, event).await
    }

    /// Look up and run the row for `event`. Caller holds the session lock.
    pub async fn apply(
        self: &Arc<Self>,
        session: &mut CallSession,
        event: EventType,
    ) -> Result<ProcessEventResult> {
        let session_id = session.session_id.clone();
        if session.finalized {
            return Err(CallRuntimeError::SessionNotFound { session: session_id }.into());
        }

        let old_state = session.state;
        let role = Role::from(session.direction);

        let Some(transition) = self.table.get(role, old_state, &event).cloned() else {
            if old_state.is_terminal() {
                warn!(
                    "Session {} already {}, rejecting {}",
                    session_id,
                    old_state,
                    event.type_name()
                );
                return Err(CallRuntimeError::AlreadyTerminated { session: session_id }.into());
            }
            debug!("No transition for {} in {} on {}", event.type_name(), old_state, session_id);
            return Err(CallRuntimeError::InvalidTransition {
                session: session_id,
                state: old_state,
                event: event.type_name().to_string(),
            }
            .into());
        };

        if !check_guards(&transition.guards, session) {
            debug!(
                "Guards {:?} blocked {} in {} on {}",
                transition.guards,
                event.type_name(),
                old_state,
                session_id
            );
            return Ok(ProcessEventResult {
                session_id,
                old_state,
                next_state: old_state,
                transition_applied: false,
                actions_executed: vec![],
                finalized: false,
            });
        }

        let tearing_down = transition.next_state.is_some_and(|s| s.is_terminal());
        let mut actions_executed = Vec::with_capacity(transition.actions.len());

        for action in &transition.actions {
            match execute_action(action, &event, session, self).await {
                Ok(()) => actions_executed.push(*action),
                Err(e) if tearing_down => {
                    // Teardown continues past failed actions
                    warn!("Action {:?} failed during teardown of {}: {}", action, session_id, e);
                }
                Err(e) => {
                    error!("Action {:?} failed for {}: {}", action, session_id, e);
                    let reason = e.to_string();
                    self.fail_session(session, &reason).await;
                    return Err(self.action_error(&event, &session_id, e));
                }
            }
        }

        if let Some(next) = transition.next_state {
            session.state = next;
            if next.is_terminal() {
                session.ended_at = Some(Utc::now());
                self.store.release_active(&session_id);
            }
        }
        let next_state = session.state;

        if old_state != next_state {
            info!("Session {} {} -> {} on {}", session_id, old_state, next_state, event.type_name());
        }

        for template in &transition.publish_events {
            match template {
                EventTemplate::StateChanged => {
                    self.announce(session, old_state, reason_for(&event));
                }
                EventTemplate::MuteChanged => {
                    self.events.publish(CallEvent::MuteChanged {
                        session_id: session_id.clone(),
                        muted: session.muted,
                    });
                }
            }
        }

        let finalized = self.settle(session);

        Ok(ProcessEventResult {
            session_id,
            old_state,
            next_state,
            transition_applied: true,
            actions_executed,
            finalized,
        })
    }

    /// Publish the session's state if it changed or was never announced
    fn announce(&self, session: &mut CallSession, old_state: CallState, reason: Option<String>) {
        if session.announced && old_state == session.state {
            return;
        }
        let previous_state = session.announced.then_some(old_state);
        session.announced = true;
        self.events.publish(CallEvent::StateChanged(CallStatusInfo {
            session_id: session.session_id.clone(),
            direction: session.direction,
            remote: session.remote.to_string(),
            new_state: session.state,
            previous_state,
            reason,
            timestamp: Utc::now(),
        }));
    }

    fn action_error(&self, event: &EventType, session_id: &SessionId, err: ActionError) -> ConverseError {
        match (event, err) {
            (EventType::Dial, ActionError::Engine(e)) => CallSetupError::Engine(e).into(),
            (_, ActionError::Adapter(e)) => e.into(),
            (_, e) => CallRuntimeError::Engine {
                session: session_id.clone(),
                reason: e.to_string(),
            }
            .into(),
        }
    }

    /// Drive a session to Terminated(Error) after a failed action
    async fn fail_session(self: &Arc<Self>, session: &mut CallSession, reason: &str) {
        if session.state.is_terminal() {
            return;
        }
        let old_state = session.state;

        if session.engine_live() && !session.engine_terminate_sent {
            if let Some(call) = session.engine_call.clone() {
                session.engine_terminate_sent = true;
                if let Err(e) = self.engine.terminate(&call).await {
                    warn!("Engine terminate failed for {}: {}", session.session_id, e);
                }
            }
        }
        if !session.connection_released {
            if let Some(connection) = session.connection.take() {
                session.connection_released = true;
                if let Err(e) = self
                    .telephony
                    .set_disconnected(connection, DisconnectCause::Error)
                    .await
                {
                    warn!("Releasing {} failed: {}", connection, e);
                }
            }
        }

        session.state = CallState::Terminated(DisconnectCause::Error);
        session.ended_at = Some(Utc::now());
        session.awaiting_enablement = false;
        self.store.release_active(&session.session_id);
        info!("Session {} {} -> {} after failure", session.session_id, old_state, session.state);
        self.announce(session, old_state, Some(reason.to_string()));
        self.settle(session);
    }

    /// Finalize a terminated session once the engine is done with it,
    /// otherwise make sure the release wait is running
    fn settle(self: &Arc<Self>, session: &mut CallSession) -> bool {
        if !session.state.is_terminal() || session.finalized {
            return false;
        }
        if session.ready_to_finalize() {
            self.finalize(session);
            true
        } else {
            if !session.release_timer_armed {
                self.spawn_release_timer(session);
            }
            false
        }
    }

    fn finalize(&self, session: &mut CallSession) {
        session.finalized = true;
        if let Some(mut guard) = session.liveness.take() {
            guard.release();
        }
        self.store.remove(&session.session_id);
        info!("Session {} finalized", session.session_id);
        self.events.publish(CallEvent::Finalized {
            session_id: session.session_id.clone(),
        });
    }

    /// Start the bounded wait for the engine to release the call
    pub fn arm_release_timer(self: &Arc<Self>, session: &mut CallSession) {
        if !session.release_timer_armed {
            self.spawn_release_timer(session);
        }
    }

    fn spawn_release_timer(self: &Arc<Self>, session: &mut CallSession) {
        session.release_timer_armed = true;
        let machine = self.clone();
        let session_id = session.session_id.clone();
        let timeout = self.settings.release_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            debug!("Release wait expired for {}", session_id);
            if let Err(e) = machine.process_event(&session_id, EventType::ReleaseTimedOut).await {
                debug!("Release timeout for {} ignored: {}", session_id, e);
            }
        });
    }

    /// Poll the phone account until it is enabled or the wait times out
    pub fn watch_enablement(self: &Arc<Self>, session_id: SessionId) {
        let machine = self.clone();
        let timeout = self.settings.enablement_timeout;
        let interval = self.settings.enablement_poll_interval;

        tokio::spawn(async move {
            let handle = machine.settings.phone_account.clone();
            let poll = async {
                loop {
                    tokio::time::sleep(interval).await;
                    if !machine.store.contains(&session_id) {
                        return false;
                    }
                    match machine.telephony.is_account_enabled(&handle).await {
                        Ok(true) => return true,
                        Ok(false) => {}
                        Err(e) => warn!("Enablement poll for {} failed: {}", session_id, e),
                    }
                }
            };

            let event = match tokio::time::timeout(timeout, poll).await {
                Ok(true) => {
                    info!("Phone account enabled, continuing {}", session_id);
                    EventType::EnablementGranted
                }
                Ok(false) => return,
                Err(_) => {
                    warn!(
                        "Phone account still disabled after {:?}, ending {}",
                        timeout, session_id
                    );
                    EventType::EnablementTimedOut
                }
            };
            if let Err(e) = machine.process_event(&session_id, event).await {
                debug!("Enablement outcome for {} ignored: {}", session_id, e);
            }
        });
    }
}

fn reason_for(event: &EventType) -> Option<String> {
    match event {
        EventType::EngineError { message } => Some(message.clone()),
        EventType::EnablementTimedOut => Some("phone account was not enabled in time".to_string()),
        EventType::Released => Some("engine released the call".to_string()),
        EventType::ReleaseTimedOut => Some("engine did not confirm the end of the call".to_string()),
        _ => None,
    }
}
