//! Error types for the converse core

use thiserror::Error;

use crate::types::{CallState, ConnectionHandle, EngineCallId, SessionId};

/// Result type for converse operations
pub type Result<T> = std::result::Result<T, ConverseError>;

/// Errors reported by the SIP engine adapter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine has not finished starting
    #[error("SIP engine not ready")]
    NotReady,

    /// The engine refused an operation
    #[error("SIP engine rejected {operation}: {reason}")]
    Rejected { operation: String, reason: String },

    /// Signaling transport failure
    #[error("SIP transport error: {message}")]
    Transport { message: String },

    /// Authentication with the registrar failed
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// The engine does not know the call
    #[error("Unknown engine call: {call_id}")]
    UnknownCall { call_id: EngineCallId },
}

impl EngineError {
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Errors reported by the telephony adapter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// The telephony subsystem refused to create a connection
    #[error("Connection refused by telephony subsystem: {reason}")]
    ConnectionRefused { reason: String },

    /// The phone account is not enabled
    #[error("Phone account {account} is disabled")]
    AccountDisabled { account: String },

    /// The phone account could not be registered
    #[error("Phone account registration failed: {reason}")]
    AccountRegistration { reason: String },

    /// Operation on a connection the subsystem no longer tracks
    #[error("Unknown connection: {handle}")]
    UnknownConnection { handle: ConnectionHandle },

    /// Any other failure inside the telephony subsystem
    #[error("Telephony subsystem error: {message}")]
    Subsystem { message: String },
}

impl AdapterError {
    pub fn connection_refused(reason: impl Into<String>) -> Self {
        Self::ConnectionRefused {
            reason: reason.into(),
        }
    }

    pub fn subsystem(message: impl Into<String>) -> Self {
        Self::Subsystem {
            message: message.into(),
        }
    }
}

/// Registration failures. Never fatal to the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// A required login field is empty
    #[error("Invalid credentials: {field} is empty")]
    InvalidCredentials { field: &'static str },

    /// The registrar rejected the credentials
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// Network or transport failure while registering
    #[error("Registration network error: {reason}")]
    Network { reason: String },

    /// Any other engine failure during login or logout
    #[error("Registration failed: {reason}")]
    Engine { reason: String },
}

impl From<EngineError> for RegistrationError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Authentication { reason } => RegistrationError::Authentication { reason },
            EngineError::Transport { message } => RegistrationError::Network { reason: message },
            other => RegistrationError::Engine {
                reason: other.to_string(),
            },
        }
    }
}

/// Failures while setting up a call. Always reported synchronously.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallSetupError {
    /// The dialed target is not a usable SIP address
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The engine cannot place calls right now
    #[error("SIP engine not ready")]
    EngineNotReady,

    /// Another call already occupies the single call slot
    #[error("Call {active} already in progress")]
    Busy { active: SessionId },

    /// No registered account to place the call from
    #[error("No registered account: {state}")]
    AccountMissing { state: String },

    /// The engine refused to place the call
    #[error("Engine refused call: {0}")]
    Engine(#[from] EngineError),
}

impl CallSetupError {
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

/// Failures on an established or establishing call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallRuntimeError {
    /// The engine reported an error for the call
    #[error("Engine error on {session}: {reason}")]
    Engine { session: SessionId, reason: String },

    /// No live session with this id
    #[error("Session not found: {session}")]
    SessionNotFound { session: SessionId },

    /// The session already reached a terminal state
    #[error("Session {session} already terminated")]
    AlreadyTerminated { session: SessionId },

    /// The event has no transition from the current state
    #[error("No transition for {event} in state {state} on {session}")]
    InvalidTransition {
        session: SessionId,
        state: CallState,
        event: String,
    },
}

/// Errors from credential persistence
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential store format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Top-level error for the converse core
#[derive(Debug, Error)]
pub enum ConverseError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    CallSetup(#[from] CallSetupError),

    #[error(transparent)]
    CallRuntime(#[from] CallRuntimeError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {message}")]
    Logging { message: String },

    #[error("Controller error: {message}")]
    Controller { message: String },
}

impl ConverseError {
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    pub fn controller(message: impl Into<String>) -> Self {
        Self::Controller {
            message: message.into(),
        }
    }

    /// Whether this error was raised before any call became visible
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, ConverseError::CallSetup(_) | ConverseError::Adapter(_))
    }
}
