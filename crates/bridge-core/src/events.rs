//! Events delivered to host listeners
//!
//! Three event streams exist, mirroring what a host application registers
//! listeners for:
//!
//! | Event name | Payload |
//! |------------|---------|
//! | `registrationStateChanged` | `{ status, state: "Registration", message }` |
//! | `callStateChanged` | `{ status, state: "Call", message, incomingFrom? }` |
//! | `incomingCall` | `{ status, state: "Call", incomingFrom }` |
//!
//! All events are emitted from the coordinator's single execution context,
//! so a subscriber sees them in callback-arrival order.
//!
//! # Example
//!
//! ```rust,no_run
//! # use sipbridge_core::BridgeCoordinator;
//! use tokio_stream::StreamExt;
//!
//! # async fn example(bridge: BridgeCoordinator) {
//! let mut events = bridge.subscribe();
//! while let Some(Ok(event)) = events.next().await {
//!     println!("{} -> {}", event.name(), event.payload());
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::call::CallState;
use crate::engine::{EngineCallState, SessionHandle};
use crate::registration::RegistrationState;

/// Value of the `state` field that tells hosts which machine moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventCategory {
    Registration,
    Call,
}

/// Payload of `registrationStateChanged`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatusInfo {
    #[serde(rename = "state")]
    pub category: EventCategory,
    /// Name of the new registration state
    pub status: String,
    /// Engine-supplied detail
    pub message: String,
    /// The new state as a typed value
    #[serde(skip)]
    pub registration_state: RegistrationState,
    pub timestamp: DateTime<Utc>,
}

/// Payload of `callStateChanged`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusInfo {
    #[serde(rename = "state")]
    pub category: EventCategory,
    /// Engine state name, passed through unchanged
    pub status: String,
    pub message: String,
    /// Remote party, present for incoming calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incoming_from: Option<String>,
    pub session: SessionHandle,
    #[serde(skip)]
    pub engine_state: EngineCallState,
    /// Lifecycle state the engine state maps to
    #[serde(skip)]
    pub call_state: CallState,
    pub timestamp: DateTime<Utc>,
}

/// Payload of `incomingCall`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallInfo {
    #[serde(rename = "state")]
    pub category: EventCategory,
    pub status: String,
    pub incoming_from: String,
    pub session: SessionHandle,
    pub timestamp: DateTime<Utc>,
}

/// An event for host listeners
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    RegistrationStateChanged(RegistrationStatusInfo),
    CallStateChanged(CallStatusInfo),
    IncomingCall(IncomingCallInfo),
}

impl BridgeEvent {
    /// Listener name the host subscribes with
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::RegistrationStateChanged(_) => "registrationStateChanged",
            BridgeEvent::CallStateChanged(_) => "callStateChanged",
            BridgeEvent::IncomingCall(_) => "incomingCall",
        }
    }

    /// JSON payload for the host
    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            BridgeEvent::RegistrationStateChanged(info) => serde_json::to_value(info),
            BridgeEvent::CallStateChanged(info) => serde_json::to_value(info),
            BridgeEvent::IncomingCall(info) => serde_json::to_value(info),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Status string carried by the event
    pub fn status(&self) -> &str {
        match self {
            BridgeEvent::RegistrationStateChanged(info) => &info.status,
            BridgeEvent::CallStateChanged(info) => &info.status,
            BridgeEvent::IncomingCall(info) => &info.status,
        }
    }

    pub(crate) fn registration(state: RegistrationState, message: String) -> Self {
        BridgeEvent::RegistrationStateChanged(RegistrationStatusInfo {
            category: EventCategory::Registration,
            status: state.name().to_string(),
            message,
            registration_state: state,
            timestamp: Utc::now(),
        })
    }

    pub(crate) fn call_state(
        session: SessionHandle,
        engine_state: EngineCallState,
        call_state: CallState,
        message: String,
        incoming_from: Option<String>,
    ) -> Self {
        BridgeEvent::CallStateChanged(CallStatusInfo {
            category: EventCategory::Call,
            status: engine_state.to_string(),
            message,
            incoming_from,
            session,
            engine_state,
            call_state,
            timestamp: Utc::now(),
        })
    }

    pub(crate) fn incoming_call(session: SessionHandle, from: String) -> Self {
        BridgeEvent::IncomingCall(IncomingCallInfo {
            category: EventCategory::Call,
            status: EngineCallState::IncomingReceived.to_string(),
            incoming_from: from,
            session,
            timestamp: Utc::now(),
        })
    }
}

/// Stream of events for one subscriber
pub type EventStream = BroadcastStream<BridgeEvent>;

/// Fan-out of coordinator events to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventEmitter {
    /// Create an emitter buffering up to `capacity` events per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event; having no subscribers is not an error
    pub fn emit(&self, event: BridgeEvent) {
        tracing::trace!(event = event.name(), status = event.status(), "emitting event");
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event emitted from now on
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Number of live subscribers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
