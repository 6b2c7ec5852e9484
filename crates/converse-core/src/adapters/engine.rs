//! SIP engine capability
//!
//! The engine owns signaling and media. The core drives it through
//! [`SipEngine`] and learns about progress through two event streams:
//! [`EngineRegistrationEvent`] for the account and [`EngineCallEvent`] for
//! individual calls. Both are delivered through an
//! [`EngineEventSink`](super::event_router::EngineEventSink).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::address::SipAddress;
use crate::errors::EngineError;
use crate::types::{Account, Credentials, EngineCallId, MediaEncryption};

/// Operations the core needs from a SIP engine
#[async_trait]
pub trait SipEngine: Send + Sync {
    /// Start registering the account. Progress arrives as registration events.
    async fn login(&self, account: &Account, credentials: &Credentials) -> Result<(), EngineError>;

    /// Unregister and forget the account
    async fn logout(&self) -> Result<(), EngineError>;

    /// Whether the engine can place calls right now
    fn is_ready(&self) -> bool;

    /// Place an outbound call
    async fn place_call(
        &self,
        remote: &SipAddress,
        encryption: MediaEncryption,
    ) -> Result<EngineCallId, EngineError>;

    async fn accept(&self, call: &EngineCallId) -> Result<(), EngineError>;

    async fn terminate(&self, call: &EngineCallId) -> Result<(), EngineError>;

    async fn set_mic_enabled(&self, enabled: bool) -> Result<(), EngineError>;

    fn mic_enabled(&self) -> bool;

    /// Pause (`true`) or resume (`false`) a call
    async fn set_hold(&self, call: &EngineCallId, on_hold: bool) -> Result<(), EngineError>;

    async fn send_dtmf(&self, call: &EngineCallId, digit: char) -> Result<(), EngineError>;
}

/// Per-call events reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineCallEvent {
    /// A remote party is calling
    IncomingReceived { remote: String },
    OutgoingInit,
    OutgoingProgress,
    OutgoingRinging,
    Connected,
    End,
    Error { message: String },
    /// The engine dropped every resource for the call
    Released,
}

/// Registration events reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineRegistrationEvent {
    Progress,
    Ok,
    Failed { reason: String },
    Retrying { reason: String },
    /// Registration removed, e.g. after logout
    Cleared,
}
