//! The tracked call session
//!
//! The coordinator follows one call at a time. A [`CallSession`] is created
//! by `makeCall` or by an incoming-call callback and is cleared only by the
//! Released callback for the same engine handle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{EngineCallState, SessionHandle};

/// Remote party reported when the engine cannot name the caller
pub const UNKNOWN_REMOTE: &str = "Unknown";

/// Direction of a call from the local user's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// Coarse lifecycle of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Outgoing call set up, not yet answered
    Initiating,
    /// Incoming call ringing, waiting for accept/decline
    IncomingReceived,
    /// Media established (including hold/update sub-states)
    Connected,
    /// Ending or errored, waiting for the engine to release it
    Terminating,
    /// Gone from the engine; terminal
    Released,
}

impl CallState {
    /// Map an engine state onto the session lifecycle
    ///
    /// Early re-INVITE states keep the session where it was before the
    /// update, so `direction` decides between Initiating and IncomingReceived.
    ///
    /// | Engine state | Session state |
    /// |--------------|---------------|
    /// | `Idle`, `Outgoing*` | `Initiating` |
    /// | `IncomingReceived`, `PushIncomingReceived`, `IncomingEarlyMedia` | `IncomingReceived` |
    /// | `Connected`, `StreamsRunning`, pause/resume/update states, `Referred` | `Connected` |
    /// | `Error`, `End` | `Terminating` |
    /// | `Released` | `Released` |
    pub fn from_engine(state: EngineCallState, direction: CallDirection) -> Self {
        use EngineCallState as E;
        match state {
            E::Idle | E::OutgoingInit | E::OutgoingProgress | E::OutgoingRinging | E::OutgoingEarlyMedia => {
                CallState::Initiating
            }
            E::IncomingReceived | E::PushIncomingReceived | E::IncomingEarlyMedia => CallState::IncomingReceived,
            E::EarlyUpdatedByRemote | E::EarlyUpdating => match direction {
                CallDirection::Incoming => CallState::IncomingReceived,
                CallDirection::Outgoing => CallState::Initiating,
            },
            E::Connected
            | E::StreamsRunning
            | E::Pausing
            | E::Paused
            | E::Resuming
            | E::PausedByRemote
            | E::UpdatedByRemote
            | E::Updating
            | E::Referred => CallState::Connected,
            E::Error | E::End => CallState::Terminating,
            E::Released => CallState::Released,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Released)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The call the coordinator is currently tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    /// Engine handle; identity of the session
    pub handle: SessionHandle,
    /// Remote party URI
    pub remote: String,
    pub direction: CallDirection,
    pub state: CallState,
    /// Last raw state reported by the engine
    pub engine_state: EngineCallState,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    /// An accept/decline has been scheduled and not yet applied
    pub answer_pending: bool,
    /// The host asked the engine to end this call
    pub termination_requested: bool,
}

impl CallSession {
    /// A session for a call the host just placed
    pub fn outgoing(handle: SessionHandle, remote: impl Into<String>) -> Self {
        Self {
            handle,
            remote: remote.into(),
            direction: CallDirection::Outgoing,
            state: CallState::Initiating,
            engine_state: EngineCallState::OutgoingInit,
            created_at: Utc::now(),
            connected_at: None,
            answer_pending: false,
            termination_requested: false,
        }
    }

    /// A session for a call the engine reported as ringing
    pub fn incoming(handle: SessionHandle, remote: impl Into<String>) -> Self {
        Self {
            handle,
            remote: remote.into(),
            direction: CallDirection::Incoming,
            state: CallState::IncomingReceived,
            engine_state: EngineCallState::IncomingReceived,
            created_at: Utc::now(),
            connected_at: None,
            answer_pending: false,
            termination_requested: false,
        }
    }

    /// Record an engine state for this session
    pub(crate) fn observe(&mut self, engine_state: EngineCallState) {
        self.engine_state = engine_state;
        self.state = CallState::from_engine(engine_state, self.direction);
        if self.state == CallState::Connected && self.connected_at.is_none() {
            self.connected_at = Some(Utc::now());
        }
    }

    pub fn is_released(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether accept/decline may be applied
    pub fn is_ringing(&self) -> bool {
        self.direction == CallDirection::Incoming
            && self.state == CallState::IncomingReceived
            && !self.termination_requested
    }

    /// Ringing and not already being answered
    pub fn is_answerable(&self) -> bool {
        self.is_ringing() && !self.answer_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_mapping() {
        let out = CallDirection::Outgoing;
        assert_eq!(CallState::from_engine(EngineCallState::OutgoingRinging, out), CallState::Initiating);
        assert_eq!(CallState::from_engine(EngineCallState::StreamsRunning, out), CallState::Connected);
        assert_eq!(CallState::from_engine(EngineCallState::End, out), CallState::Terminating);
        assert_eq!(CallState::from_engine(EngineCallState::Released, out), CallState::Released);
    }

    #[test]
    fn test_early_update_keeps_direction() {
        assert_eq!(
            CallState::from_engine(EngineCallState::EarlyUpdating, CallDirection::Incoming),
            CallState::IncomingReceived
        );
        assert_eq!(
            CallState::from_engine(EngineCallState::EarlyUpdating, CallDirection::Outgoing),
            CallState::Initiating
        );
    }

    #[test]
    fn test_observe_tracks_connect_time() {
        let mut session = CallSession::incoming(SessionHandle(7), "sip:bob@example.com");
        assert!(session.is_ringing());

        session.observe(EngineCallState::Connected);
        assert_eq!(session.state, CallState::Connected);
        assert!(!session.is_ringing());
        let connected_at = session.connected_at;
        assert!(connected_at.is_some());

        session.observe(EngineCallState::StreamsRunning);
        assert_eq!(session.connected_at, connected_at);

        session.observe(EngineCallState::Released);
        assert!(session.is_released());
    }

    #[test]
    fn test_markers_close_the_answer_window() {
        let mut session = CallSession::incoming(SessionHandle(3), "sip:dave@example.com");
        assert!(session.is_answerable());

        session.answer_pending = true;
        assert!(session.is_ringing());
        assert!(!session.is_answerable());

        session.termination_requested = true;
        assert!(!session.is_ringing());
    }

    #[test]
    fn test_outgoing_session_is_not_ringing() {
        let session = CallSession::outgoing(SessionHandle(1), "sip:carol@example.com");
        assert_eq!(session.state, CallState::Initiating);
        assert!(!session.is_ringing());
    }
}
