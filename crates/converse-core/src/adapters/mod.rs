//! Adapter layer
//!
//! Capability traits for the two external systems the core drives, plus the
//! channel plumbing that carries their callbacks back in.

pub mod engine;
pub mod telephony;
pub mod event_router;

pub use engine::{EngineCallEvent, EngineRegistrationEvent, SipEngine};
pub use event_router::{
    BridgeInput, EngineEventSink, EventReceivers, EventRouter, EventSinks, TelephonyEventSink,
};
pub use telephony::{ConnectionOptions, Telephony, TelephonyEvent, TelephonyEventKind};
