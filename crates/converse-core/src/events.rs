//! Observer fan-out for call and registration events
//!
//! Every subscriber owns an unbounded queue, so a slow observer never causes
//! another to lose events and every subscriber sees every event in the order
//! it was published. Publishing is synchronous and never blocks, which lets
//! the bridge publish while it holds a session lock and keep ordering tight.
//!
//! # Example
//!
//! ```rust
//! use converse_core::events::EventBus;
//!
//! # tokio_test::block_on(async {
//! let bus: EventBus<u32> = EventBus::new();
//! let mut stream = bus.subscribe();
//! bus.publish(1);
//! bus.publish(2);
//! assert_eq!(stream.recv().await, Some(1));
//! assert_eq!(stream.recv().await, Some(2));
//! # });
//! ```

use chrono::{DateTime, Utc};
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::types::{CallDirection, CallState, RegistrationState, SessionId};

/// Lossless, ordered fan-out to any number of subscribers
pub struct EventBus<T> {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<T>>>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe to all events published from now on
    pub fn subscribe(&self) -> EventStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        EventStream {
            inner: UnboundedReceiverStream::new(rx),
        }
    }

    /// Deliver an event to every live subscriber; dropped subscribers are pruned
    pub fn publish(&self, event: T) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Receiving half of an [`EventBus`] subscription
pub struct EventStream<T> {
    inner: UnboundedReceiverStream<T>,
}

impl<T> EventStream<T> {
    /// Wait for the next event; `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<T> {
        self.inner.as_mut().recv().await
    }

    /// Take an event if one is already queued
    pub fn try_recv(&mut self) -> Option<T> {
        self.inner.as_mut().try_recv().ok()
    }

    /// Drain every event queued so far
    pub fn drain(&mut self) -> Vec<T> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Call state change details
#[derive(Debug, Clone, PartialEq)]
pub struct CallStatusInfo {
    pub session_id: SessionId,
    pub direction: CallDirection,
    /// Remote party as dialed or as reported by the engine
    pub remote: String,
    pub new_state: CallState,
    /// `None` for the first state a session announces
    pub previous_state: Option<CallState>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Events published by the call bridge
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// The unified call state changed
    StateChanged(CallStatusInfo),
    /// The local microphone was muted or unmuted
    MuteChanged { session_id: SessionId, muted: bool },
    /// Both sides released the call and its resources are gone
    Finalized { session_id: SessionId },
}

impl CallEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            CallEvent::StateChanged(info) => &info.session_id,
            CallEvent::MuteChanged { session_id, .. } => session_id,
            CallEvent::Finalized { session_id } => session_id,
        }
    }

    /// The new state if this is a state change
    pub fn state(&self) -> Option<CallState> {
        match self {
            CallEvent::StateChanged(info) => Some(info.new_state),
            _ => None,
        }
    }
}

/// Registration state change details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationStatusInfo {
    /// Address of record of the account, when one exists
    pub account: Option<String>,
    pub state: RegistrationState,
    pub previous: RegistrationState,
    pub timestamp: DateTime<Utc>,
}
