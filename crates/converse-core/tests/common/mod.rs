//! Recording fakes for the engine, telephony and host, plus a bridge harness
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use converse_core::adapters::{
    BridgeInput, ConnectionOptions, EngineCallEvent, EngineRegistrationEvent, SipEngine,
    Telephony, TelephonyEvent, TelephonyEventKind,
};
use converse_core::address::SipAddress;
use converse_core::bridge::CallBridge;
use converse_core::config::{ConverseConfig, CredentialPersistence};
use converse_core::credentials::MemoryCredentialStore;
use converse_core::errors::{AdapterError, EngineError};
use converse_core::events::{CallEvent, EventStream};
use converse_core::liveness::{ForegroundHost, LivenessController};
use converse_core::registration::RegistrationManager;
use converse_core::types::{
    Account, CallState, ConnectionHandle, Credentials, DisconnectCause, EngineCallId,
    MediaEncryption, PhoneAccountHandle, SessionId, TransportKind,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    Login(String),
    Logout,
    PlaceCall(String),
    Accept(EngineCallId),
    Terminate(EngineCallId),
    SetMic(bool),
    SetHold(EngineCallId, bool),
    SendDtmf(EngineCallId, char),
}

pub struct FakeEngine {
    ops: Mutex<Vec<EngineOp>>,
    ready: AtomicBool,
    mic: AtomicBool,
    next_call: AtomicU64,
    pub fail_login: Mutex<Option<EngineError>>,
    pub fail_place_call: Mutex<Option<EngineError>>,
    pub fail_accept: Mutex<Option<EngineError>>,
    pub fail_hold: Mutex<Option<EngineError>>,
    pub fail_set_mic: Mutex<Option<EngineError>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            ready: AtomicBool::new(true),
            mic: AtomicBool::new(true),
            next_call: AtomicU64::new(1),
            fail_login: Mutex::new(None),
            fail_place_call: Mutex::new(None),
            fail_accept: Mutex::new(None),
            fail_hold: Mutex::new(None),
            fail_set_mic: Mutex::new(None),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn ops(&self) -> Vec<EngineOp> {
        self.ops.lock().clone()
    }

    pub fn mic_enabled(&self) -> bool {
        self.mic.load(Ordering::SeqCst)
    }

    pub fn terminate_count(&self, call: &EngineCallId) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, EngineOp::Terminate(c) if c == call))
            .count()
    }

    pub fn count(&self, pred: impl Fn(&EngineOp) -> bool) -> usize {
        self.ops.lock().iter().filter(|op| pred(op)).count()
    }

    fn record(&self, op: EngineOp) {
        self.ops.lock().push(op);
    }
}

#[async_trait]
impl SipEngine for FakeEngine {
    async fn login(&self, account: &Account, _credentials: &Credentials) -> Result<(), EngineError> {
        self.record(EngineOp::Login(account.identity()));
        match self.fail_login.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn logout(&self) -> Result<(), EngineError> {
        self.record(EngineOp::Logout);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn place_call(
        &self,
        remote: &SipAddress,
        _encryption: MediaEncryption,
    ) -> Result<EngineCallId, EngineError> {
        self.record(EngineOp::PlaceCall(remote.to_string()));
        if let Some(e) = self.fail_place_call.lock().clone() {
            return Err(e);
        }
        let n = self.next_call.fetch_add(1, Ordering::SeqCst);
        Ok(EngineCallId::new(format!("out-{}", n)))
    }

    async fn accept(&self, call: &EngineCallId) -> Result<(), EngineError> {
        self.record(EngineOp::Accept(call.clone()));
        match self.fail_accept.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn terminate(&self, call: &EngineCallId) -> Result<(), EngineError> {
        self.record(EngineOp::Terminate(call.clone()));
        Ok(())
    }

    async fn set_mic_enabled(&self, enabled: bool) -> Result<(), EngineError> {
        self.record(EngineOp::SetMic(enabled));
        if let Some(e) = self.fail_set_mic.lock().clone() {
            return Err(e);
        }
        self.mic.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn mic_enabled(&self) -> bool {
        self.mic.load(Ordering::SeqCst)
    }

    async fn set_hold(&self, call: &EngineCallId, on_hold: bool) -> Result<(), EngineError> {
        self.record(EngineOp::SetHold(call.clone(), on_hold));
        if let Some(e) = self.fail_hold.lock().clone() {
            return Err(e);
        }
        Ok(())
    }

    async fn send_dtmf(&self, call: &EngineCallId, digit: char) -> Result<(), EngineError> {
        self.record(EngineOp::SendDtmf(call.clone(), digit));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyOp {
    RegisterAccount(PhoneAccountHandle),
    RequestEnable,
    CreateIncoming(ConnectionHandle, String),
    PlaceOutgoing(ConnectionHandle, String),
    SetActive(ConnectionHandle),
    SetRinging(ConnectionHandle),
    SetDialing(ConnectionHandle),
    SetDisconnected(ConnectionHandle, DisconnectCause),
    SetMuted(ConnectionHandle, bool),
}

pub struct FakeTelephony {
    ops: Mutex<Vec<TelephonyOp>>,
    enabled: AtomicBool,
    refuse_connections: AtomicBool,
    next_connection: AtomicU64,
}

impl FakeTelephony {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
            refuse_connections: AtomicBool::new(false),
            next_connection: AtomicU64::new(1),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub fn ops(&self) -> Vec<TelephonyOp> {
        self.ops.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&TelephonyOp) -> bool) -> usize {
        self.ops.lock().iter().filter(|op| pred(op)).count()
    }

    pub fn disconnects(&self) -> Vec<(ConnectionHandle, DisconnectCause)> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                TelephonyOp::SetDisconnected(c, cause) => Some((*c, *cause)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: TelephonyOp) {
        self.ops.lock().push(op);
    }

    fn allocate(&self) -> Result<ConnectionHandle, AdapterError> {
        if self.refuse_connections.load(Ordering::SeqCst) {
            return Err(AdapterError::connection_refused("too many calls"));
        }
        Ok(ConnectionHandle(self.next_connection.fetch_add(1, Ordering::SeqCst)))
    }
}

#[async_trait]
impl Telephony for FakeTelephony {
    async fn register_account(
        &self,
        handle: &PhoneAccountHandle,
        _label: &str,
    ) -> Result<bool, AdapterError> {
        self.record(TelephonyOp::RegisterAccount(handle.clone()));
        Ok(self.enabled.load(Ordering::SeqCst))
    }

    async fn is_account_enabled(&self, _handle: &PhoneAccountHandle) -> Result<bool, AdapterError> {
        Ok(self.enabled.load(Ordering::SeqCst))
    }

    async fn request_enable_account(&self, _handle: &PhoneAccountHandle) -> Result<(), AdapterError> {
        self.record(TelephonyOp::RequestEnable);
        Ok(())
    }

    async fn create_incoming_connection(
        &self,
        _handle: &PhoneAccountHandle,
        remote: &SipAddress,
        _options: &ConnectionOptions,
    ) -> Result<ConnectionHandle, AdapterError> {
        let connection = self.allocate()?;
        self.record(TelephonyOp::CreateIncoming(connection, remote.to_string()));
        Ok(connection)
    }

    async fn place_outgoing_connection(
        &self,
        _handle: &PhoneAccountHandle,
        remote: &SipAddress,
        _options: &ConnectionOptions,
    ) -> Result<ConnectionHandle, AdapterError> {
        let connection = self.allocate()?;
        self.record(TelephonyOp::PlaceOutgoing(connection, remote.to_string()));
        Ok(connection)
    }

    async fn set_active(&self, connection: ConnectionHandle) -> Result<(), AdapterError> {
        self.record(TelephonyOp::SetActive(connection));
        Ok(())
    }

    async fn set_ringing(&self, connection: ConnectionHandle) -> Result<(), AdapterError> {
        self.record(TelephonyOp::SetRinging(connection));
        Ok(())
    }

    async fn set_dialing(&self, connection: ConnectionHandle) -> Result<(), AdapterError> {
        self.record(TelephonyOp::SetDialing(connection));
        Ok(())
    }

    async fn set_disconnected(
        &self,
        connection: ConnectionHandle,
        cause: DisconnectCause,
    ) -> Result<(), AdapterError> {
        self.record(TelephonyOp::SetDisconnected(connection, cause));
        Ok(())
    }

    async fn set_muted(&self, connection: ConnectionHandle, muted: bool) -> Result<(), AdapterError> {
        self.record(TelephonyOp::SetMuted(connection, muted));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeHost {
    pub entered: AtomicUsize,
    pub exited: AtomicUsize,
}

impl FakeHost {
    pub fn transitions(&self) -> (usize, usize) {
        (
            self.entered.load(Ordering::SeqCst),
            self.exited.load(Ordering::SeqCst),
        )
    }
}

impl ForegroundHost for FakeHost {
    fn enter_foreground(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
    }

    fn exit_foreground(&self) {
        self.exited.fetch_add(1, Ordering::SeqCst);
    }
}

/// A bridge wired to fakes, driven directly through `dispatch`
pub struct Harness {
    pub config: ConverseConfig,
    pub engine: Arc<FakeEngine>,
    pub telephony: Arc<FakeTelephony>,
    pub host: Arc<FakeHost>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub liveness: LivenessController,
    pub registration: Arc<RegistrationManager>,
    pub bridge: CallBridge,
    pub events: EventStream<CallEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ConverseConfig) -> Self {
        let engine = Arc::new(FakeEngine::new());
        let telephony = Arc::new(FakeTelephony::new());
        let host = Arc::new(FakeHost::default());
        let credentials = Arc::new(MemoryCredentialStore::new());
        let liveness = LivenessController::new(host.clone());

        let registration = Arc::new(RegistrationManager::new(
            engine.clone(),
            liveness.clone(),
            credentials.clone(),
            config.credential_persistence,
            TransportKind::Tcp,
        ));
        let bridge = CallBridge::new(
            &config,
            engine.clone(),
            telephony.clone(),
            liveness.clone(),
            registration.view(),
        );
        let events = bridge.subscribe();

        Self {
            config,
            engine,
            telephony,
            host,
            credentials,
            liveness,
            registration,
            bridge,
            events,
        }
    }

    /// Log in and confirm registration so dialing is allowed
    pub async fn registered(self) -> Self {
        self.registration
            .login(Credentials::new("alice", "secret", "example.com"))
            .await
            .unwrap();
        self.registration.handle_engine_event(EngineRegistrationEvent::Ok);
        self
    }

    pub async fn engine(&self, call: &str, event: EngineCallEvent) -> converse_core::Result<()> {
        self.bridge
            .dispatch(BridgeInput::Engine {
                call: EngineCallId::new(call),
                event,
            })
            .await
    }

    pub async fn telephony(
        &self,
        connection: ConnectionHandle,
        kind: TelephonyEventKind,
    ) -> converse_core::Result<()> {
        self.bridge
            .dispatch(BridgeInput::Telephony(TelephonyEvent::new(connection, kind)))
            .await
    }

    /// Ring an inbound call and return its session id
    pub async fn incoming(&self, call: &str, remote: &str) -> SessionId {
        self.engine(
            call,
            EngineCallEvent::IncomingReceived {
                remote: remote.to_string(),
            },
        )
        .await
        .unwrap();
        self.bridge
            .current_call()
            .await
            .map(|info| info.session_id)
            .unwrap()
    }

    /// Every published event so far
    pub fn drain(&mut self) -> Vec<CallEvent> {
        self.events.drain()
    }
}

pub fn test_config() -> ConverseConfig {
    ConverseConfig::new()
        .with_dial_domain("pbx.example.net")
        .with_enablement_timeout(Duration::from_secs(30))
        .with_enablement_poll_interval(Duration::from_millis(500))
        .with_release_timeout(Duration::from_secs(5))
        .with_credential_persistence(CredentialPersistence::OnSuccess)
}

/// The sequence of states published for one session
pub fn states_for(events: &[CallEvent], session: &SessionId) -> Vec<CallState> {
    events
        .iter()
        .filter(|e| e.session_id() == session)
        .filter_map(|e| e.state())
        .collect()
}

pub fn finalized(events: &[CallEvent], session: &SessionId) -> bool {
    events
        .iter()
        .any(|e| matches!(e, CallEvent::Finalized { session_id } if session_id == session))
}
