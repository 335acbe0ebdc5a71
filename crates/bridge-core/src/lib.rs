//! sipbridge-core: host-facing coordinator for a callback-driven SIP engine
//!
//! This crate turns an external SIP/media engine, which runs its own event
//! loop and reports progress through callbacks, into a request/response
//! command API plus an ordered event stream that a host application can
//! consume.
//!
//! ## Layering
//! ```text
//! host (plugin shell / app) -> dispatch -> BridgeCoordinator -> EngineAdapter -> SipEngine
//!                                                 └──────────-> AccessPointGate -> AccessPointPlatform
//! ```
//!
//! The coordinator focuses on:
//! - Tracking the single registered account and the single active call
//! - Serializing host commands against engine callbacks
//! - Mapping engine states onto registration/call lifecycles
//! - A permission-gated, single-flight access-point (BSSID) query
//!
//! SIP signaling, codecs and audio routing stay inside the engine.

pub mod access_point;
pub mod call;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod mock;
pub mod registration;

// Public API exports
pub use access_point::{AccessPointPlatform, AuthorizationState, PlatformError};
pub use call::{CallDirection, CallSession, CallState};
pub use config::{BridgeConfig, EngineOptions};
pub use coordinator::{BridgeCoordinator, REGISTRATION_IN_PROGRESS};
pub use dispatch::{dispatch, PluginCall, PluginOutcome};
pub use engine::{EngineEvent, EngineEventSink, SessionHandle, SipEngine};
pub use error::{BridgeError, BridgeResult};
pub use events::{BridgeEvent, CallStatusInfo, EventStream, IncomingCallInfo, RegistrationStatusInfo};
pub use registration::{AccountRegistration, RegistrationState};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
