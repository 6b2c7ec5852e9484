//! # Converse Core - SIP calling bridged into a native telephony subsystem
//!
//! This crate keeps a third-party SIP engine and a device's call-management
//! subsystem in agreement about every call. It is organized around:
//!
//! - **Registration**: login/logout of a single SIP account, with the
//!   engine's registration events turned into ordered state changes
//! - **Call Bridge**: a table-driven state machine per call that applies
//!   engine and telephony events under a per-call lock
//! - **Liveness**: a counter that keeps the host process foregrounded while
//!   calls or registration attempts are in flight
//! - **Controller**: the process-lifetime context with explicit start and
//!   teardown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use converse_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run(
//! #     engine: Arc<dyn SipEngine>,
//! #     telephony: Arc<dyn Telephony>,
//! #     host: Arc<dyn ForegroundHost>,
//! # ) -> converse_core::Result<()> {
//! let config = ConverseConfig::default();
//! setup_logging(LoggingConfig::from_settings(&config.logging)?)?;
//!
//! let store = Arc::new(MemoryCredentialStore::new());
//! let (controller, _sinks) = Controller::new(config, engine, telephony, host, store)?;
//! controller.start().await?;
//!
//! controller
//!     .registration()
//!     .login(Credentials::new("alice", "secret", "example.com"))
//!     .await?;
//!
//! let mut calls = controller.bridge().subscribe();
//! while let Some(event) = calls.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Adapters
//!
//! The engine and the telephony subsystem are reached only through the
//! [`SipEngine`](adapters::SipEngine) and [`Telephony`](adapters::Telephony)
//! traits. Their callbacks come back in through the
//! [`EventSinks`](adapters::EventSinks) returned by
//! [`Controller::new`](controller::Controller::new).

pub mod address;
pub mod adapters;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod liveness;
pub mod logging;
pub mod registration;
pub mod session_store;
pub mod state_machine;
pub mod state_table;
pub mod types;

pub use errors::{ConverseError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commonly used types
pub mod prelude {
    pub use crate::address::{normalize_dial_target, SipAddress};
    pub use crate::adapters::{
        ConnectionOptions, EngineCallEvent, EngineRegistrationEvent, EventSinks, SipEngine,
        Telephony, TelephonyEvent, TelephonyEventKind,
    };
    pub use crate::bridge::CallBridge;
    pub use crate::config::{ConverseConfig, CredentialPersistence};
    pub use crate::controller::Controller;
    pub use crate::credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
    pub use crate::errors::{
        AdapterError, CallRuntimeError, CallSetupError, ConverseError, EngineError,
        RegistrationError, Result,
    };
    pub use crate::events::{CallEvent, CallStatusInfo, EventStream, RegistrationStatusInfo};
    pub use crate::liveness::{ForegroundHost, LivenessController};
    pub use crate::logging::{setup_logging, LoggingConfig};
    pub use crate::registration::RegistrationManager;
    pub use crate::types::{
        CallDirection, CallInfo, CallState, ConnectionHandle, Credentials, DisconnectCause,
        EngineCallId, MediaEncryption, PhoneAccountHandle, RegistrationState, SessionId,
        TransportKind,
    };
}
