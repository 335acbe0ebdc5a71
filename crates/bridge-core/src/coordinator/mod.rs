//! Bridge coordinator
//!
//! The coordinator owns the single tracked account and the single tracked
//! call, and it is the only place either is mutated. It runs as one tokio
//! task; host commands, engine callbacks, authorization callbacks and the
//! engine tick are all delivered to that task as messages, so state
//! transitions never race each other.
//!
//! [`BridgeCoordinator`] is the cheap, cloneable handle hosts talk to. Each
//! method sends a command and waits for the task's reply. Commands resolve as
//! soon as the engine has accepted the request; outcomes (registration
//! completed, call connected) arrive on the event stream.
//!
//! # Architecture
//!
//! ```text
//!   host ──► BridgeCoordinator ──Command──┐
//!                                         ▼
//!   SipEngine ──EngineEventSink──► ┌──────────────┐ ──► EventEmitter ──► listeners
//!   platform ──AuthorizationSink─► │ actor (task) │
//!   timers ──DeferredAnswer──────► └──────┬───────┘
//!                                         │ tick / engine calls
//!                                   EngineAdapter
//! ```
//!
//! The task stops when [`BridgeCoordinator::shutdown`] is called or when the
//! last handle is dropped. Stopping it stops the engine and releases any
//! pending access-point request.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sipbridge_core::{BridgeConfig, BridgeCoordinator};
//! use sipbridge_core::access_point::AuthorizationState;
//! use sipbridge_core::mock::{MockEngine, MockPlatform};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (engine, _engine_handle) = MockEngine::new();
//! let (platform, _platform_handle) = MockPlatform::new(AuthorizationState::Granted);
//!
//! let bridge = BridgeCoordinator::spawn(Box::new(engine), Arc::new(platform), BridgeConfig::default())?;
//! bridge.initialize().await?;
//! bridge.register("alice", Some("secret".into()), "example.com").await?;
//! bridge.make_call("bob").await?;
//! # Ok(())
//! # }
//! ```

mod actor;
mod calls;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::access_point::{AccessPointGate, AccessPointPlatform, AuthorizationSink};
use crate::call::CallSession;
use crate::config::BridgeConfig;
use crate::engine::{EngineAdapter, EngineEventSink, SipEngine};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{EventEmitter, EventStream};
use crate::registration::RegistrationState;

use actor::Actor;

/// Acknowledgment returned by `register`
pub const REGISTRATION_IN_PROGRESS: &str = "Registration in progress...";

pub(crate) type Reply<T> = oneshot::Sender<BridgeResult<T>>;

/// Account details for `register`
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct RegisterRequest {
    pub username: String,
    pub password: Option<String>,
    pub domain: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("domain", &self.domain)
            .finish()
    }
}

/// Host commands processed by the coordinator task
#[derive(Debug)]
pub(crate) enum Command {
    /// Configure and start the engine
    Initialize { reply: Reply<()> },

    /// Stop the engine and end the task
    Shutdown { reply: Reply<()> },

    /// Submit an account for registration
    Register { request: RegisterRequest, reply: Reply<String> },

    /// Drop every account and credential
    Unregister { reply: Reply<()> },

    /// Read the last observed registration state
    RegistrationStatus { reply: Reply<RegistrationState> },

    /// Place an outgoing call
    MakeCall { address: String, reply: Reply<()> },

    /// Hang up the tracked call
    TerminateCall { reply: Reply<()> },

    /// Answer the ringing call
    AcceptCall { reply: Reply<()> },

    /// Turn down the ringing call
    DeclineCall { reply: Reply<()> },

    /// Mute or unmute the microphone
    SetMute { mute: bool, reply: Reply<()> },

    /// Route audio to the speaker or the earpiece
    SetSpeaker { speaker: bool, reply: Reply<()> },

    /// Look up the current access-point identifier
    AccessPointId { reply: Reply<String> },

    /// Snapshot of the tracked call
    CurrentCall { reply: Reply<Option<CallSession>> },
}

/// Handle to a running coordinator
///
/// Cloning the handle is cheap; all clones talk to the same task.
#[derive(Debug, Clone)]
pub struct BridgeCoordinator {
    commands: mpsc::Sender<Command>,
    events: EventEmitter,
}

impl BridgeCoordinator {
    /// Start a coordinator task for `engine` and `platform`
    ///
    /// The engine is not started until [`initialize`](Self::initialize) is
    /// called. Must be called from within a tokio runtime.
    pub fn spawn(
        engine: Box<dyn SipEngine>,
        platform: Arc<dyn AccessPointPlatform>,
        config: BridgeConfig,
    ) -> BridgeResult<Self> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let (engine_sink, engine_rx) = EngineEventSink::channel();
        let (authorization_sink, authorization_rx) = AuthorizationSink::channel();
        let events = EventEmitter::new(config.event_buffer);

        let adapter = EngineAdapter::new(engine, config.engine.clone(), engine_sink);
        let gate = AccessPointGate::new(platform, authorization_sink);
        let (actor, deferred_rx) = Actor::new(config, adapter, gate, events.clone());

        tokio::spawn(actor.run(command_rx, engine_rx, authorization_rx, deferred_rx));
        info!("bridge coordinator spawned");

        Ok(Self {
            commands: command_tx,
            events,
        })
    }

    /// Subscribe to coordinator events
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Configure and start the engine; calling it again is a no-op
    pub async fn initialize(&self) -> BridgeResult<()> {
        self.request(|reply| Command::Initialize { reply }).await
    }

    /// Stop the engine and the coordinator task
    ///
    /// Every later command on any handle fails with [`BridgeError::Internal`].
    pub async fn shutdown(&self) -> BridgeResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Submit an account and start registering it
    ///
    /// Resolves with [`REGISTRATION_IN_PROGRESS`] once the engine accepted
    /// the account. The registration outcome arrives as a
    /// `registrationStateChanged` event.
    pub async fn register(
        &self,
        username: impl Into<String>,
        password: Option<String>,
        domain: impl Into<String>,
    ) -> BridgeResult<String> {
        let request = RegisterRequest {
            username: username.into(),
            password,
            domain: domain.into(),
        };
        self.request(|reply| Command::Register { request, reply }).await
    }

    /// Remove every account and credential from the engine
    pub async fn unregister(&self) -> BridgeResult<()> {
        self.request(|reply| Command::Unregister { reply }).await
    }

    /// Last registration state reported by the engine
    pub async fn registration_status(&self) -> BridgeResult<RegistrationState> {
        self.request(|reply| Command::RegistrationStatus { reply }).await
    }

    /// Place a call to `address`
    ///
    /// A bare user (`"bob"`) is completed with the registered domain and a
    /// missing scheme defaults to `sip:`.
    pub async fn make_call(&self, address: impl Into<String>) -> BridgeResult<()> {
        let address = address.into();
        self.request(|reply| Command::MakeCall { address, reply }).await
    }

    /// Hang up the tracked call; succeeds when there is none
    pub async fn terminate_call(&self) -> BridgeResult<()> {
        self.request(|reply| Command::TerminateCall { reply }).await
    }

    /// Answer the ringing incoming call
    pub async fn accept_call(&self) -> BridgeResult<()> {
        self.request(|reply| Command::AcceptCall { reply }).await
    }

    /// Decline the ringing incoming call
    pub async fn decline_call(&self) -> BridgeResult<()> {
        self.request(|reply| Command::DeclineCall { reply }).await
    }

    /// Mute (`true`) or unmute the microphone
    pub async fn set_mute(&self, mute: bool) -> BridgeResult<()> {
        self.request(|reply| Command::SetMute { mute, reply }).await
    }

    /// Route audio to the speaker (`true`) or the earpiece
    pub async fn set_speaker(&self, speaker: bool) -> BridgeResult<()> {
        self.request(|reply| Command::SetSpeaker { speaker, reply }).await
    }

    /// Identifier (BSSID) of the current Wi-Fi access point
    ///
    /// May wait for the user to answer an authorization prompt.
    pub async fn current_access_point_id(&self) -> BridgeResult<String> {
        self.request(|reply| Command::AccessPointId { reply }).await
    }

    /// Copy of the tracked call, if any
    pub async fn current_call(&self) -> BridgeResult<Option<CallSession>> {
        self.request(|reply| Command::CurrentCall { reply }).await
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> BridgeResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| BridgeError::internal("coordinator is not running"))?;
        rx.await
            .map_err(|_| BridgeError::internal("coordinator dropped the request"))?
    }
}
