//! Telephony subsystem capability
//!
//! The telephony subsystem arbitrates ringing, in-call UI and audio focus. It
//! only sees calls as connections; every connection maps 1:1 onto a live call
//! session in the bridge.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::address::SipAddress;
use crate::errors::AdapterError;
use crate::types::{ConnectionHandle, DisconnectCause, PhoneAccountHandle};

/// Capabilities and modes requested for every connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// The app manages its own call UI
    pub self_managed: bool,
    /// Route audio in VoIP mode
    pub voip_audio_mode: bool,
    pub supports_hold: bool,
    pub supports_mute: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            self_managed: true,
            voip_audio_mode: true,
            supports_hold: true,
            supports_mute: true,
        }
    }
}

/// Operations the core needs from the telephony subsystem
#[async_trait]
pub trait Telephony: Send + Sync {
    /// Register the phone account. Returns whether it is enabled.
    async fn register_account(
        &self,
        handle: &PhoneAccountHandle,
        label: &str,
    ) -> Result<bool, AdapterError>;

    async fn is_account_enabled(&self, handle: &PhoneAccountHandle) -> Result<bool, AdapterError>;

    /// Ask the user to enable the account. The outcome is only visible by
    /// polling [`Telephony::is_account_enabled`].
    async fn request_enable_account(&self, handle: &PhoneAccountHandle) -> Result<(), AdapterError>;

    async fn create_incoming_connection(
        &self,
        handle: &PhoneAccountHandle,
        caller: &SipAddress,
        options: &ConnectionOptions,
    ) -> Result<ConnectionHandle, AdapterError>;

    async fn place_outgoing_connection(
        &self,
        handle: &PhoneAccountHandle,
        remote: &SipAddress,
        options: &ConnectionOptions,
    ) -> Result<ConnectionHandle, AdapterError>;

    async fn set_active(&self, connection: ConnectionHandle) -> Result<(), AdapterError>;

    async fn set_ringing(&self, connection: ConnectionHandle) -> Result<(), AdapterError>;

    async fn set_dialing(&self, connection: ConnectionHandle) -> Result<(), AdapterError>;

    /// Mark the connection disconnected and release it
    async fn set_disconnected(
        &self,
        connection: ConnectionHandle,
        cause: DisconnectCause,
    ) -> Result<(), AdapterError>;

    async fn set_muted(&self, connection: ConnectionHandle, muted: bool) -> Result<(), AdapterError>;
}

/// User or OS driven requests on a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelephonyEventKind {
    Answer,
    Reject,
    Disconnect,
    Hold,
    Unhold,
    MuteChanged { muted: bool },
    PlayDtmf { digit: char },
}

/// A telephony request addressed to one connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelephonyEvent {
    pub connection: ConnectionHandle,
    pub kind: TelephonyEventKind,
}

impl TelephonyEvent {
    pub fn new(connection: ConnectionHandle, kind: TelephonyEventKind) -> Self {
        Self { connection, kind }
    }
}
