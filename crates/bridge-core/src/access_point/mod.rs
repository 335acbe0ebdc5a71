//! Permission-gated access-point query
//!
//! Reading the identifier (BSSID) of the current Wi-Fi access point needs a
//! platform authorization, typically location access. The platform owns that
//! authorization and reports changes through an observer; this module defines
//! the platform contract ([`AccessPointPlatform`]) and the scoped observer
//! registration ([`ObserverGuard`]). The single-flight request logic lives in
//! [`gate`].
//!
//! ```text
//!               getCurrentAccessPointId()
//!                          │
//!        ┌─────────────────┼──────────────────┐
//!     Granted         Undetermined       Denied/Restricted
//!        │                 │                  │
//!   query now      park request,        PermissionDenied
//!                  prompt the user
//!                          │
//!              onAuthorizationChanged(..)
//!                  │               │
//!              Granted        Denied/Restricted
//!            query, resolve   PermissionDenied
//! ```

pub mod gate;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub use gate::AccessPointGate;

/// Platform authorization for reading network details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationState {
    /// The user has not been asked yet
    Undetermined,
    /// Access allowed
    Granted,
    /// The user refused
    Denied,
    /// Policy forbids asking; treated like `Denied`
    Restricted,
}

impl AuthorizationState {
    /// Whether the state is a final refusal
    pub fn is_refusal(&self) -> bool {
        matches!(self, AuthorizationState::Denied | AuthorizationState::Restricted)
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Failure of the platform's access-point lookup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("not associated with a Wi-Fi network")]
    NotConnected,

    #[error("{0}")]
    Other(String),
}

/// Registration handle for an authorization observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Where a platform reports authorization changes
#[derive(Debug, Clone)]
pub struct AuthorizationSink {
    tx: mpsc::UnboundedSender<AuthorizationState>,
}

impl AuthorizationSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<AuthorizationState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report the new authorization state
    pub fn authorization_changed(&self, state: AuthorizationState) {
        if self.tx.send(state).is_err() {
            tracing::trace!(%state, "authorization change dropped, coordinator is gone");
        }
    }
}

/// Platform services the access-point query relies on
#[async_trait]
pub trait AccessPointPlatform: Send + Sync {
    /// Current authorization, read synchronously
    fn authorization_state(&self) -> AuthorizationState;

    /// Show the authorization prompt; the answer arrives through an observer
    fn request_authorization(&self);

    /// Start delivering authorization changes to `sink`
    fn add_authorization_observer(&self, sink: AuthorizationSink) -> ObserverId;

    /// Stop delivering to a previously added observer
    fn remove_authorization_observer(&self, id: ObserverId);

    /// Identifier of the access point the device is associated with
    async fn current_access_point(&self) -> Result<String, PlatformError>;
}

/// An authorization observer registration that is removed on drop
///
/// Holding the guard keeps callbacks flowing; dropping it, on any path,
/// unregisters the observer from the platform.
pub struct ObserverGuard {
    platform: Arc<dyn AccessPointPlatform>,
    id: ObserverId,
}

impl ObserverGuard {
    /// Register `sink` with the platform for as long as the guard lives
    pub fn acquire(platform: Arc<dyn AccessPointPlatform>, sink: AuthorizationSink) -> Self {
        let id = platform.add_authorization_observer(sink);
        tracing::debug!(observer = id.0, "authorization observer added");
        Self { platform, id }
    }
}

impl fmt::Debug for ObserverGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverGuard").field("id", &self.id).finish()
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        self.platform.remove_authorization_observer(self.id);
        tracing::debug!(observer = self.id.0, "authorization observer removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPlatform;

    #[test]
    fn test_guard_releases_observer() {
        let (platform, handle) = MockPlatform::new(AuthorizationState::Undetermined);
        let platform: Arc<dyn AccessPointPlatform> = Arc::new(platform);
        let (sink, _rx) = AuthorizationSink::channel();

        let guard = ObserverGuard::acquire(platform.clone(), sink);
        assert_eq!(handle.observer_count(), 1);
        drop(guard);
        assert_eq!(handle.observer_count(), 0);
    }

    #[test]
    fn test_refusals() {
        assert!(AuthorizationState::Denied.is_refusal());
        assert!(AuthorizationState::Restricted.is_refusal());
        assert!(!AuthorizationState::Undetermined.is_refusal());
        assert!(!AuthorizationState::Granted.is_refusal());
    }
}
