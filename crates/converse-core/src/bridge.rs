//! Call Bridge
//!
//! The bridge keeps the SIP engine's view of a call and the telephony
//! subsystem's view of the same call in agreement. Events from both sides
//! (and from the app) go through the state table in
//! [`state_table`](crate::state_table); the bridge itself handles what the
//! table cannot express:
//!
//! - **Admission**: only one call may be live. A second incoming call is
//!   terminated at the engine, a second dial fails with `Busy`.
//! - **Session creation**: incoming calls query phone account enablement
//!   before the session is locked; outbound dials are fully validated before
//!   any connection is requested, so a bad dial never shows up as ringing.
//! - **Routing**: engine events are matched by engine call id, telephony
//!   events by connection handle.
//!
//! # Example
//!
//! ```rust,no_run
//! # use converse_core::bridge::CallBridge;
//! # async fn example(bridge: CallBridge) -> converse_core::errors::Result<()> {
//! let mut events = bridge.subscribe();
//! let call = bridge.dial("tel:+15550100199").await?;
//! println!("dialing {} as {}", call.remote, call.session_id);
//!
//! bridge.set_muted(&call.session_id, true).await?;
//! bridge.hangup(&call.session_id).await?;
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::address::{caller_name, normalize_dial_target, SipAddress};
use crate::adapters::{
    BridgeInput, ConnectionOptions, EngineCallEvent, SipEngine, Telephony, TelephonyEvent,
};
use crate::config::ConverseConfig;
use crate::errors::{AdapterError, CallRuntimeError, CallSetupError, ConverseError, Result};
use crate::events::{CallEvent, CallStatusInfo, EventBus, EventStream};
use crate::liveness::{LivenessController, LivenessReason};
use crate::registration::RegistrationView;
use crate::session_store::{CallSession, SessionStore};
use crate::state_machine::{MachineSettings, StateMachine};
use crate::state_table::{EventType, MASTER_TABLE};
use crate::types::{
    CallDirection, CallInfo, CallState, DisconnectCause, EngineCallId, MediaEncryption,
    RegistrationState, SessionId,
};

/// Bridge between the SIP engine and the telephony subsystem
#[derive(Clone)]
pub struct CallBridge {
    machine: Arc<StateMachine>,
    liveness: LivenessController,
    registration: RegistrationView,
    dial_domain: String,
    encryption: MediaEncryption,
}

impl CallBridge {
    pub fn new(
        config: &ConverseConfig,
        engine: Arc<dyn SipEngine>,
        telephony: Arc<dyn Telephony>,
        liveness: LivenessController,
        registration: RegistrationView,
    ) -> Self {
        let settings = MachineSettings {
            phone_account: config.phone_account.handle(),
            connection_options: ConnectionOptions::default(),
            enablement_timeout: config.enablement_timeout(),
            enablement_poll_interval: config.enablement_poll_interval(),
            release_timeout: config.release_timeout(),
        };
        let machine = StateMachine::new(
            MASTER_TABLE.clone(),
            Arc::new(SessionStore::new()),
            engine,
            telephony,
            EventBus::new(),
            settings,
        );

        Self {
            machine: Arc::new(machine),
            liveness,
            registration,
            dial_domain: config.dial_domain.clone(),
            encryption: config.media_encryption,
        }
    }

    /// Every call event from now on, in order
    pub fn subscribe(&self) -> EventStream<CallEvent> {
        self.machine.events().subscribe()
    }

    /// Route one adapter event
    pub async fn dispatch(&self, input: BridgeInput) -> Result<()> {
        match input {
            BridgeInput::Engine { call, event } => self.handle_engine_event(call, event).await,
            BridgeInput::Telephony(event) => self.handle_telephony_event(event).await,
        }
    }

    /// Consume adapter events until the channel closes
    pub fn spawn_event_loop(&self, mut rx: mpsc::Receiver<BridgeInput>) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            while let Some(input) = rx.recv().await {
                if let Err(e) = bridge.dispatch(input).await {
                    debug!("Bridge event not applied: {}", e);
                }
            }
            info!("Bridge event loop stopped");
        })
    }

    async fn handle_engine_event(&self, call: EngineCallId, event: EngineCallEvent) -> Result<()> {
        if let EngineCallEvent::IncomingReceived { remote } = event {
            return self.handle_incoming(call, &remote).await;
        }

        let store = self.machine.store();
        // An outbound call's first events can race the return of place_call
        let Some(session_id) = store.find_by_engine_call(&call).or_else(|| store.active()) else {
            debug!("No session for engine call {}, dropping {:?}", call, event);
            return Ok(());
        };

        self.machine
            .process_engine_event(&session_id, &call, event.into())
            .await
            .map(|_| ())
    }

    async fn handle_incoming(&self, call: EngineCallId, remote: &str) -> Result<()> {
        let engine = self.machine.engine();
        let caller = caller_name(remote);

        let remote = match SipAddress::parse(remote)
            .or_else(|_| normalize_dial_target(remote, &self.dial_domain))
        {
            Ok(remote) => remote,
            Err(parse_err) => {
                warn!("Incoming call {} from unusable address: {}", call, parse_err);
                if let Err(e) = engine.terminate(&call).await {
                    warn!("Terminating {} failed: {}", call, e);
                }
                return Err(parse_err.into());
            }
        };

        let session_id = SessionId::new();
        if let Err(active) = self.machine.store().try_claim_active(&session_id) {
            warn!("Call {} in progress, declining incoming {} from {}", active, call, remote);
            if let Err(e) = engine.terminate(&call).await {
                warn!("Terminating {} failed: {}", call, e);
            }
            return Err(CallSetupError::Busy { active }.into());
        }

        // Blocking query, done before the session lock exists
        let phone_account = &self.machine.settings().phone_account;
        let enabled = match self.machine.telephony().is_account_enabled(phone_account).await {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!("Could not query phone account {}: {}", phone_account, e);
                false
            }
        };

        match &caller {
            Some(name) => info!(
                "Incoming call {} from {} <{}> as {}",
                call,
                name,
                remote.display_name(),
                session_id
            ),
            None => info!("Incoming call {} from {} as {}", call, remote.display_name(), session_id),
        }
        let session = CallSession::new(session_id, CallDirection::Inbound, remote, self.encryption)
            .with_engine_call(call)
            .with_liveness(self.liveness.acquire(LivenessReason::Call));
        let mut session = self.machine.store().insert_locked(session).await;

        let event = if enabled {
            EventType::IncomingReceived
        } else {
            EventType::EnablementRequired
        };
        self.machine.apply(&mut session, event).await.map(|_| ())
    }

    async fn handle_telephony_event(&self, event: TelephonyEvent) -> Result<()> {
        let Some(session_id) = self.machine.store().find_by_connection(&event.connection) else {
            warn!("Telephony event {:?} for unknown connection {}", event.kind, event.connection);
            return Err(AdapterError::UnknownConnection {
                handle: event.connection,
            }
            .into());
        };
        self.machine
            .process_event(&session_id, event.kind.into())
            .await
            .map(|_| ())
    }

    /// Place an outbound call.
    ///
    /// The target, engine readiness, registration and phone account are all
    /// checked before a connection is requested. A failed check publishes a
    /// single `Terminated(Error)` and returns the error.
    pub async fn dial(&self, target: &str) -> Result<CallInfo> {
        let session_id = SessionId::new();

        let remote = match self.validate_dial(target).await {
            Ok(remote) => remote,
            Err(e) => {
                self.publish_refused(&session_id, target, &e);
                return Err(e);
            }
        };

        if let Err(active) = self.machine.store().try_claim_active(&session_id) {
            let err: ConverseError = CallSetupError::Busy { active }.into();
            self.publish_refused(&session_id, target, &err);
            return Err(err);
        }

        info!("Dialing {} as {}", remote, session_id);
        let session = CallSession::new(session_id, CallDirection::Outbound, remote, self.encryption)
            .with_liveness(self.liveness.acquire(LivenessReason::Call));
        let mut session = self.machine.store().insert_locked(session).await;

        self.machine.apply(&mut session, EventType::Dial).await?;
        Ok(session.info())
    }

    async fn validate_dial(&self, target: &str) -> Result<SipAddress> {
        let remote = normalize_dial_target(target, &self.dial_domain)?;

        if let Some(active) = self.machine.store().active() {
            return Err(CallSetupError::Busy { active }.into());
        }
        if !self.machine.engine().is_ready() {
            return Err(CallSetupError::EngineNotReady.into());
        }
        let registration = self.registration.current();
        if registration != RegistrationState::Registered {
            return Err(CallSetupError::AccountMissing {
                state: registration.to_string(),
            }
            .into());
        }

        let telephony = self.machine.telephony();
        let phone_account = &self.machine.settings().phone_account;
        if !telephony.is_account_enabled(phone_account).await? {
            if let Err(e) = telephony.request_enable_account(phone_account).await {
                warn!("Enablement request for {} failed: {}", phone_account, e);
            }
            return Err(AdapterError::AccountDisabled {
                account: phone_account.to_string(),
            }
            .into());
        }

        Ok(remote)
    }

    /// Report a dial that never became a call
    fn publish_refused(&self, session_id: &SessionId, target: &str, err: &ConverseError) {
        warn!("Dial to {:?} refused: {}", target, err);
        self.machine.events().publish(CallEvent::StateChanged(CallStatusInfo {
            session_id: session_id.clone(),
            direction: CallDirection::Outbound,
            remote: target.to_string(),
            new_state: CallState::Terminated(DisconnectCause::Error),
            previous_state: None,
            reason: Some(err.to_string()),
            timestamp: Utc::now(),
        }));
    }

    /// Hang up a call. Hanging up an already terminated call is a no-op.
    pub async fn hangup(&self, session_id: &SessionId) -> Result<()> {
        match self.machine.process_event(session_id, EventType::Hangup).await {
            Ok(_) => Ok(()),
            Err(ConverseError::CallRuntime(CallRuntimeError::AlreadyTerminated { .. })) => {
                debug!("Session {} already terminated, hangup skipped", session_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Mute or unmute the local microphone
    pub async fn set_muted(&self, session_id: &SessionId, muted: bool) -> Result<()> {
        self.machine
            .process_event(session_id, EventType::LocalMute { muted })
            .await
            .map(|_| ())
    }

    /// Move every live call to Disconnecting; used when the process stops
    pub async fn shutdown(&self) {
        for session_id in self.machine.store().session_ids() {
            if let Err(e) = self.machine.process_event(&session_id, EventType::Shutdown).await {
                debug!("Shutdown of {} skipped: {}", session_id, e);
            }
        }
    }

    /// The live (non-terminated) call, if any
    pub async fn current_call(&self) -> Option<CallInfo> {
        let session_id = self.machine.store().active()?;
        self.call(&session_id).await
    }

    pub async fn call(&self, session_id: &SessionId) -> Option<CallInfo> {
        let handle = self.machine.store().get(session_id)?;
        let session = handle.lock().await;
        Some(session.info())
    }

    /// Sessions not yet finalized, terminated ones included
    pub fn active_count(&self) -> usize {
        self.machine.store().len()
    }
}
