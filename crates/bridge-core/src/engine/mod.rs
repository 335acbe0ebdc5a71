//! SIP/media engine contract
//!
//! The engine is an external collaborator: it owns SIP signaling, audio
//! routing and its own event loop. This module defines the capability
//! interface the bridge consumes ([`SipEngine`]), the callback events the
//! engine produces ([`EngineEvent`]), and the small value types that cross
//! the boundary.
//!
//! # Callback model
//!
//! Engines queue internal work and only turn it into callbacks while
//! [`SipEngine::iterate`] runs. Callbacks are delivered through the
//! [`EngineEventSink`] handed to [`SipEngine::start`]; the sink forwards them
//! into the coordinator's serialized context, so an engine never calls back
//! into coordinator state directly.
//!
//! ```text
//! ┌──────────────┐  iterate() every tick   ┌──────────────┐
//! │ EngineAdapter├────────────────────────►│  SipEngine   │
//! └──────┬───────┘                         └──────┬───────┘
//!        │ owned by                               │ EngineEventSink
//! ┌──────▼──────────────────────────────────────────▼───────┐
//! │              coordinator actor (one task)               │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod adapter;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::config::EngineOptions;

pub use adapter::EngineAdapter;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures reported by the engine for a single operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid SIP address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("{operation} rejected: {reason}")]
    Rejected { operation: String, reason: String },

    #[error("unknown session {session}")]
    UnknownSession { session: SessionHandle },

    #[error("engine is not running")]
    NotStarted,

    #[error("engine failed to start: {reason}")]
    StartFailed { reason: String },
}

impl EngineError {
    /// Create a rejection for the named operation
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

/// Opaque handle the engine assigns to a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(pub u64);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Opaque handle the engine assigns to an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account-{}", self.0)
    }
}

/// A syntactically valid `sip:`/`sips:` URI
///
/// ```rust
/// use sipbridge_core::engine::SipAddress;
///
/// let addr = SipAddress::parse("sip:alice@example.com").unwrap();
/// assert_eq!(addr.user(), Some("alice"));
/// assert_eq!(addr.host(), "example.com");
///
/// assert!(SipAddress::parse("http://example.com").is_err());
/// assert!(SipAddress::parse("sip:").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SipAddress(String);

impl SipAddress {
    /// Validate and wrap a SIP URI
    pub fn parse(uri: &str) -> EngineResult<Self> {
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err(EngineError::invalid_address(uri, "empty address"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(EngineError::invalid_address(uri, "address contains whitespace"));
        }

        let url = Url::parse(trimmed).map_err(|e| EngineError::invalid_address(uri, e.to_string()))?;
        match url.scheme() {
            "sip" | "sips" => {}
            other => {
                return Err(EngineError::invalid_address(uri, format!("unsupported scheme '{}'", other)));
            }
        }

        let address = Self(trimmed.to_string());
        if let Some(user) = address.user() {
            if user.is_empty() {
                return Err(EngineError::invalid_address(uri, "empty user part"));
            }
        }
        if address.host().is_empty() {
            return Err(EngineError::invalid_address(uri, "missing host"));
        }
        Ok(address)
    }

    /// The full URI
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn hier_part(&self) -> &str {
        let rest = self.0.split_once(':').map(|(_, rest)| rest).unwrap_or("");
        rest.split(|c| c == ';' || c == '?').next().unwrap_or("")
    }

    /// User part, if the URI has one
    pub fn user(&self) -> Option<&str> {
        self.hier_part().rsplit_once('@').map(|(user, _)| user)
    }

    /// Host part, including any port
    pub fn host(&self) -> &str {
        let hier = self.hier_part();
        hier.rsplit_once('@').map(|(_, host)| host).unwrap_or(hier)
    }
}

impl fmt::Display for SipAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authentication material handed to the engine
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
    pub domain: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("domain", &self.domain)
            .finish()
    }
}

/// Parameters for creating an engine account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountParams {
    /// Public identity, `sip:<user>@<domain>`
    pub identity: SipAddress,
    /// Registrar/proxy, `sip:<domain>`
    pub server: SipAddress,
    /// Whether the engine registers the account on its own
    pub register_enabled: bool,
}

/// Why an incoming call is turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    Declined,
}

/// Capability tag of an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioDeviceType {
    Microphone,
    Earpiece,
    Speaker,
    Bluetooth,
    Headphones,
    Unknown,
}

/// An audio endpoint known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub device_type: AudioDeviceType,
}

impl AudioDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, device_type: AudioDeviceType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_type,
        }
    }
}

/// Account registration states as the engine reports them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineRegistrationState {
    None,
    Progress,
    Ok,
    Refreshing,
    Cleared,
    Failed,
}

impl fmt::Display for EngineRegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Call states as the engine reports them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineCallState {
    Idle,
    IncomingReceived,
    PushIncomingReceived,
    OutgoingInit,
    OutgoingProgress,
    OutgoingRinging,
    OutgoingEarlyMedia,
    Connected,
    StreamsRunning,
    Pausing,
    Paused,
    Resuming,
    Referred,
    Error,
    End,
    PausedByRemote,
    UpdatedByRemote,
    IncomingEarlyMedia,
    Updating,
    Released,
    EarlyUpdatedByRemote,
    EarlyUpdating,
}

impl fmt::Display for EngineCallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A callback produced by the engine while it iterates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    RegistrationStateChanged {
        account: AccountId,
        state: EngineRegistrationState,
        message: String,
    },
    CallStateChanged {
        session: SessionHandle,
        state: EngineCallState,
        /// Remote party URI, when the engine knows it
        remote: Option<String>,
        message: String,
    },
}

/// Where an engine delivers its callbacks
///
/// Cloning is cheap. Delivery never blocks; once the coordinator is gone the
/// callbacks are dropped.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineEventSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver an arbitrary engine event
    pub fn deliver(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("engine callback dropped, coordinator is gone");
        }
    }

    /// Report an account registration state change
    pub fn registration_state_changed(&self, account: AccountId, state: EngineRegistrationState, message: impl Into<String>) {
        self.deliver(EngineEvent::RegistrationStateChanged {
            account,
            state,
            message: message.into(),
        });
    }

    /// Report a call state change
    pub fn call_state_changed(
        &self,
        session: SessionHandle,
        state: EngineCallState,
        remote: Option<String>,
        message: impl Into<String>,
    ) {
        self.deliver(EngineEvent::CallStateChanged {
            session,
            state,
            remote,
            message: message.into(),
        });
    }
}

/// Capability interface of the external SIP/media engine
///
/// Operations are synchronous submissions: they return once the engine has
/// accepted the request, and the outcome arrives later as an [`EngineEvent`].
pub trait SipEngine: Send {
    /// Apply tuning before start
    fn configure(&mut self, options: &EngineOptions) -> EngineResult<()>;

    /// Start the engine; callbacks go to `sink` from now on
    fn start(&mut self, sink: EngineEventSink) -> EngineResult<()>;

    /// Stop the engine and drop the callback sink
    fn stop(&mut self);

    /// Process queued engine work, emitting callbacks
    fn iterate(&mut self);

    /// Parse and validate an address the way the engine would
    fn parse_address(&self, uri: &str) -> EngineResult<SipAddress> {
        SipAddress::parse(uri)
    }

    /// Store authentication material
    fn add_auth_info(&mut self, credentials: Credentials) -> EngineResult<()>;

    /// Create an account and add it to the engine
    fn add_account(&mut self, params: AccountParams) -> EngineResult<AccountId>;

    /// Make `account` the one used for outgoing calls
    fn set_default_account(&mut self, account: AccountId) -> EngineResult<()>;

    /// Remove every account
    fn clear_accounts(&mut self);

    /// Forget every stored credential
    fn clear_all_auth_info(&mut self);

    /// Start an outgoing call
    fn invite(&mut self, address: &SipAddress) -> EngineResult<SessionHandle>;

    /// Stop ringtone/ringback playback
    fn stop_ringing(&mut self);

    /// Answer an incoming call
    fn accept(&mut self, session: SessionHandle) -> EngineResult<()>;

    /// Turn down an incoming call
    fn decline(&mut self, session: SessionHandle, reason: DeclineReason) -> EngineResult<()>;

    /// Hang up one call
    fn terminate(&mut self, session: SessionHandle) -> EngineResult<()>;

    /// Hang up every call the engine knows about
    fn terminate_all_calls(&mut self) -> EngineResult<()>;

    /// Enable or disable the microphone
    fn set_mic_enabled(&mut self, enabled: bool);

    /// Enumerate audio devices
    fn audio_devices(&self) -> Vec<AudioDevice>;

    /// Route call audio to `device`
    fn set_output_device(&mut self, device: &AudioDevice);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addresses() {
        let addr = SipAddress::parse("sips:bob@pbx.example.com:5061;transport=tls").unwrap();
        assert_eq!(addr.user(), Some("bob"));
        assert_eq!(addr.host(), "pbx.example.com:5061");

        let domain_only = SipAddress::parse("sip:example.com").unwrap();
        assert_eq!(domain_only.user(), None);
        assert_eq!(domain_only.host(), "example.com");
    }

    #[test]
    fn test_reject_bad_addresses() {
        for bad in ["", "   ", "sip:", "sip:@example.com", "sip:bob@", "tel:+15551234", "sip:bo b@example.com"] {
            assert!(
                matches!(SipAddress::parse(bad), Err(EngineError::InvalidAddress { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials {
            username: "alice".to_string(),
            password: Some("hunter2".to_string()),
            domain: "example.com".to_string(),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(EngineCallState::StreamsRunning.to_string(), "StreamsRunning");
        assert_eq!(EngineRegistrationState::Ok.to_string(), "Ok");
    }
}
