//! Event Router - connects adapter callbacks to the bridge and registration loops
//!
//! Adapters report events through cloneable sinks. Engine call events and
//! telephony events share one ordered channel consumed by the bridge's
//! single transition loop; registration events have their own channel
//! consumed by the registration manager.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::engine::{EngineCallEvent, EngineRegistrationEvent};
use super::telephony::{TelephonyEvent, TelephonyEventKind};
use crate::types::{ConnectionHandle, EngineCallId};

const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// One event for the call bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeInput {
    Engine {
        call: EngineCallId,
        event: EngineCallEvent,
    },
    Telephony(TelephonyEvent),
}

/// Sink for SIP engine callbacks
#[derive(Clone)]
pub struct EngineEventSink {
    calls: mpsc::Sender<BridgeInput>,
    registration: mpsc::Sender<EngineRegistrationEvent>,
}

impl EngineEventSink {
    pub async fn call_event(&self, call: EngineCallId, event: EngineCallEvent) {
        debug!("Engine call event {:?} for {}", event, call);
        if self.calls.send(BridgeInput::Engine { call, event }).await.is_err() {
            warn!("Bridge loop is gone, dropping engine call event");
        }
    }

    pub async fn registration_event(&self, event: EngineRegistrationEvent) {
        debug!("Engine registration event {:?}", event);
        if self.registration.send(event).await.is_err() {
            warn!("Registration loop is gone, dropping registration event");
        }
    }
}

/// Sink for telephony subsystem callbacks
#[derive(Clone)]
pub struct TelephonyEventSink {
    tx: mpsc::Sender<BridgeInput>,
}

impl TelephonyEventSink {
    pub async fn send(&self, connection: ConnectionHandle, kind: TelephonyEventKind) {
        debug!("Telephony event {:?} on {}", kind, connection);
        let input = BridgeInput::Telephony(TelephonyEvent::new(connection, kind));
        if self.tx.send(input).await.is_err() {
            warn!("Bridge loop is gone, dropping telephony event");
        }
    }

    pub fn try_send(&self, connection: ConnectionHandle, kind: TelephonyEventKind) -> bool {
        self.tx
            .try_send(BridgeInput::Telephony(TelephonyEvent::new(connection, kind)))
            .is_ok()
    }
}

/// Both adapter sinks, handed to whoever wires the adapters up
#[derive(Clone)]
pub struct EventSinks {
    pub engine: EngineEventSink,
    pub telephony: TelephonyEventSink,
}

/// Receiving ends, consumed by the event loops
pub struct EventReceivers {
    pub bridge: mpsc::Receiver<BridgeInput>,
    pub registration: mpsc::Receiver<EngineRegistrationEvent>,
}

/// Owns the channels between adapters and the core
pub struct EventRouter {
    sinks: EventSinks,
    receivers: Option<EventReceivers>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (bridge_tx, bridge_rx) = mpsc::channel(capacity);
        let (registration_tx, registration_rx) = mpsc::channel(capacity);

        Self {
            sinks: EventSinks {
                engine: EngineEventSink {
                    calls: bridge_tx.clone(),
                    registration: registration_tx,
                },
                telephony: TelephonyEventSink { tx: bridge_tx },
            },
            receivers: Some(EventReceivers {
                bridge: bridge_rx,
                registration: registration_rx,
            }),
        }
    }

    pub fn sinks(&self) -> EventSinks {
        self.sinks.clone()
    }

    /// Hand out the receivers; only the first call gets them
    pub fn take_receivers(&mut self) -> Option<EventReceivers> {
        self.receivers.take()
    }
}
