//! Core data model shared by the registration manager and the call bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::SipAddress;

/// Unique identifier of one call attempt
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("session-{}", uuid::Uuid::new_v4()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Call identifier minted by the SIP engine
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct EngineCallId(pub String);

impl EngineCallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for EngineCallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token for one call's registration with the telephony subsystem
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHandle(pub u64);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifies the phone account this app registers with the telephony subsystem
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct PhoneAccountHandle {
    pub component: String,
    pub id: String,
}

impl PhoneAccountHandle {
    pub fn new(component: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for PhoneAccountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component, self.id)
    }
}

/// A phone account as registered with the telephony subsystem.
///
/// Lives independently of [`Account`]: it is registered once at process start
/// and survives any number of login/logout cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneAccountRegistration {
    pub handle: PhoneAccountHandle,
    pub label: String,
    pub enabled: bool,
}

/// Which side originated the call
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Why a call ended
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum DisconnectCause {
    Local,
    Rejected,
    Error,
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectCause::Local => write!(f, "local"),
            DisconnectCause::Rejected => write!(f, "rejected"),
            DisconnectCause::Error => write!(f, "error"),
        }
    }
}

/// Unified state of a call, reconciled from the engine and telephony views
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallState {
    Dialing,
    Ringing,
    Active,
    OnHold,
    /// Local teardown requested, waiting for the engine to end the call
    Disconnecting,
    Terminated(DisconnectCause),
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Terminated(_))
    }

    /// All non-terminal states, used for wildcard expansion and validation
    pub fn live_states() -> [CallState; 5] {
        [
            CallState::Dialing,
            CallState::Ringing,
            CallState::Active,
            CallState::OnHold,
            CallState::Disconnecting,
        ]
    }

    pub fn terminal_states() -> [CallState; 3] {
        [
            CallState::Terminated(DisconnectCause::Local),
            CallState::Terminated(DisconnectCause::Rejected),
            CallState::Terminated(DisconnectCause::Error),
        ]
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Dialing => write!(f, "Dialing"),
            CallState::Ringing => write!(f, "Ringing"),
            CallState::Active => write!(f, "Active"),
            CallState::OnHold => write!(f, "OnHold"),
            CallState::Disconnecting => write!(f, "Disconnecting"),
            CallState::Terminated(cause) => write!(f, "Terminated({})", cause),
        }
    }
}

/// Registration status of the SIP account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationState {
    LoggedOut,
    Registering,
    Registered,
    Failed(String),
    Retrying,
}

impl RegistrationState {
    /// Whether a registration attempt is in flight
    pub fn is_attempt(&self) -> bool {
        matches!(self, RegistrationState::Registering | RegistrationState::Retrying)
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationState::LoggedOut => write!(f, "LoggedOut"),
            RegistrationState::Registering => write!(f, "Registering"),
            RegistrationState::Registered => write!(f, "Registered"),
            RegistrationState::Failed(reason) => write!(f, "Failed({})", reason),
            RegistrationState::Retrying => write!(f, "Retrying"),
        }
    }
}

/// SIP signaling transport
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Udp,
    #[default]
    Tcp,
    Tls,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Udp => write!(f, "UDP"),
            TransportKind::Tcp => write!(f, "TCP"),
            TransportKind::Tls => write!(f, "TLS"),
        }
    }
}

/// Media encryption requested from the engine when placing a call
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaEncryption {
    #[default]
    None,
    Srtp,
    Zrtp,
    Dtls,
}

/// Login credentials for one SIP account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// The SIP account currently logged in (or logging in)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub domain: String,
    pub transport: TransportKind,
    /// Reference to the credentials held by the credential store
    pub credential_ref: String,
    pub state: RegistrationState,
}

impl Account {
    pub fn new(credentials: &Credentials, transport: TransportKind) -> Self {
        Self {
            id: format!("account-{}", uuid::Uuid::new_v4()),
            username: credentials.username.clone(),
            domain: credentials.domain.clone(),
            transport,
            credential_ref: format!("{}@{}", credentials.username, credentials.domain),
            state: RegistrationState::LoggedOut,
        }
    }

    /// The account's address of record, `sip:user@domain`
    pub fn identity(&self) -> String {
        format!("sip:{}@{}", self.username, self.domain)
    }
}

/// Read-only snapshot of a call session
#[derive(Debug, Clone, PartialEq)]
pub struct CallInfo {
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
}
