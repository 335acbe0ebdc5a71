//! Single-flight gate for the access-point query
//!
//! At most one request waits on an authorization decision. While it waits the
//! gate holds an [`ObserverGuard`]; the guard is dropped together with the
//! request whichever way the request ends, so the platform observer never
//! outlives it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult};

use super::{AccessPointPlatform, AuthorizationSink, AuthorizationState, ObserverGuard};

/// Reply channel of one access-point query
pub(crate) type QueryReply = oneshot::Sender<BridgeResult<String>>;

struct PendingQuery {
    reply: QueryReply,
    observer: ObserverGuard,
    requested_at: DateTime<Utc>,
}

/// Owns the pending-request slot and routes authorization decisions
pub struct AccessPointGate {
    platform: Arc<dyn AccessPointPlatform>,
    sink: AuthorizationSink,
    pending: Option<PendingQuery>,
}

impl AccessPointGate {
    pub fn new(platform: Arc<dyn AccessPointPlatform>, sink: AuthorizationSink) -> Self {
        Self {
            platform,
            sink,
            pending: None,
        }
    }

    /// Whether a request is waiting on an authorization decision
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a query; the answer is sent on `reply`
    pub(crate) fn query(&mut self, reply: QueryReply) {
        if let Some(pending) = &self.pending {
            if !pending.reply.is_closed() {
                debug!("access point query rejected, another one is pending");
                let _ = reply.send(Err(BridgeError::QueryAlreadyInProgress));
                return;
            }
            // The waiting caller went away; its slot can be reused.
            debug!(since = %pending.requested_at, "discarding abandoned access point query");
            self.pending = None;
        }

        let state = self.platform.authorization_state();
        match state {
            AuthorizationState::Granted => self.fetch(reply, None),
            AuthorizationState::Undetermined => {
                let observer = ObserverGuard::acquire(self.platform.clone(), self.sink.clone());
                self.pending = Some(PendingQuery {
                    reply,
                    observer,
                    requested_at: Utc::now(),
                });
                info!("requesting authorization for access point query");
                self.platform.request_authorization();
            }
            AuthorizationState::Denied | AuthorizationState::Restricted => {
                debug!(%state, "access point query refused");
                let _ = reply.send(Err(BridgeError::PermissionDenied));
            }
        }
    }

    /// Apply an authorization change reported by the platform
    pub(crate) fn on_authorization_changed(&mut self, state: AuthorizationState) {
        let Some(pending) = self.pending.take() else {
            debug!(%state, "authorization changed with no pending query");
            return;
        };

        match state {
            AuthorizationState::Undetermined => {
                self.pending = Some(pending);
            }
            AuthorizationState::Granted => {
                info!("authorization granted, resolving pending access point query");
                let PendingQuery { reply, observer, .. } = pending;
                self.fetch(reply, Some(observer));
            }
            AuthorizationState::Denied | AuthorizationState::Restricted => {
                warn!(%state, "authorization refused, failing pending access point query");
                let _ = pending.reply.send(Err(BridgeError::PermissionDenied));
            }
        }
    }

    fn fetch(&self, reply: QueryReply, observer: Option<ObserverGuard>) {
        let platform = self.platform.clone();
        tokio::spawn(async move {
            let result = match platform.current_access_point().await {
                Ok(id) if id.trim().is_empty() => Err(BridgeError::query_unavailable("platform returned an empty identifier")),
                Ok(id) => Ok(id),
                Err(e) => Err(BridgeError::query_unavailable(e.to_string())),
            };
            if let Err(e) = &result {
                warn!(error = %e, "access point query failed");
            }
            let _ = reply.send(result);
            drop(observer);
        });
    }
}

impl std::fmt::Debug for AccessPointGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPointGate")
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_point::PlatformError;
    use crate::mock::{MockPlatform, MockPlatformHandle};
    use tracing_test::traced_test;

    fn gate(state: AuthorizationState) -> (AccessPointGate, MockPlatformHandle) {
        let (platform, handle) = MockPlatform::new(state);
        let (sink, _rx) = AuthorizationSink::channel();
        (AccessPointGate::new(Arc::new(platform), sink), handle)
    }

    #[tokio::test]
    async fn test_granted_queries_immediately() {
        let (mut gate, handle) = gate(AuthorizationState::Granted);
        handle.set_access_point(Ok("d8:ec:5e:d5:cb:56".to_string()));

        let (tx, rx) = oneshot::channel();
        gate.query(tx);
        assert!(!gate.has_pending());
        assert_eq!(rx.await.unwrap().unwrap(), "d8:ec:5e:d5:cb:56");
        assert_eq!(handle.authorization_requests(), 0);
    }

    #[tokio::test]
    async fn test_granted_failure_is_unavailable() {
        let (mut gate, handle) = gate(AuthorizationState::Granted);
        handle.set_access_point(Err(PlatformError::NotConnected));

        let (tx, rx) = oneshot::channel();
        gate.query(tx);
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::QueryUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_empty_identifier_is_unavailable() {
        let (mut gate, handle) = gate(AuthorizationState::Granted);
        handle.set_access_point(Ok("  ".to_string()));

        let (tx, rx) = oneshot::channel();
        gate.query(tx);
        assert!(matches!(rx.await.unwrap(), Err(BridgeError::QueryUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_undetermined_parks_request() {
        let (mut gate, handle) = gate(AuthorizationState::Undetermined);
        handle.set_access_point(Ok("aa:bb:cc:dd:ee:ff".to_string()));

        let (tx, rx) = oneshot::channel();
        gate.query(tx);
        assert!(gate.has_pending());
        assert_eq!(handle.authorization_requests(), 1);
        assert_eq!(handle.observer_count(), 1);

        gate.on_authorization_changed(AuthorizationState::Granted);
        assert!(!gate.has_pending());
        assert_eq!(rx.await.unwrap().unwrap(), "aa:bb:cc:dd:ee:ff");
        tokio::task::yield_now().await;
        assert_eq!(handle.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_undetermined_change_keeps_waiting() {
        let (mut gate, handle) = gate(AuthorizationState::Undetermined);
        let (tx, mut rx) = oneshot::channel();
        gate.query(tx);

        gate.on_authorization_changed(AuthorizationState::Undetermined);
        assert!(gate.has_pending());
        assert_eq!(handle.observer_count(), 1);
        assert!(rx.try_recv().is_err());

        gate.on_authorization_changed(AuthorizationState::Denied);
        assert!(!gate.has_pending());
        assert_eq!(handle.observer_count(), 0);
        assert_eq!(rx.await.unwrap(), Err(BridgeError::PermissionDenied));
    }

    #[tokio::test]
    async fn test_second_query_is_rejected() {
        let (mut gate, handle) = gate(AuthorizationState::Undetermined);
        let (first_tx, _first_rx) = oneshot::channel();
        gate.query(first_tx);

        let (second_tx, second_rx) = oneshot::channel();
        gate.query(second_tx);
        assert_eq!(second_rx.await.unwrap(), Err(BridgeError::QueryAlreadyInProgress));
        assert_eq!(handle.authorization_requests(), 1);
        assert!(gate.has_pending());
    }

    #[tokio::test]
    async fn test_abandoned_query_frees_slot() {
        let (mut gate, handle) = gate(AuthorizationState::Undetermined);
        let (first_tx, first_rx) = oneshot::channel();
        gate.query(first_tx);
        drop(first_rx);

        let (second_tx, _second_rx) = oneshot::channel();
        gate.query(second_tx);
        assert!(gate.has_pending());
        assert_eq!(handle.authorization_requests(), 2);
        assert_eq!(handle.observer_count(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_refusal_after_prompt_is_logged() {
        let (mut gate, _handle) = gate(AuthorizationState::Undetermined);
        let (tx, _rx) = oneshot::channel();
        gate.query(tx);
        gate.on_authorization_changed(AuthorizationState::Restricted);
        assert!(logs_contain("authorization refused"));
    }

    #[tokio::test]
    async fn test_denied_fails_without_prompt() {
        let (mut gate, handle) = gate(AuthorizationState::Denied);
        let (tx, rx) = oneshot::channel();
        gate.query(tx);
        assert_eq!(rx.await.unwrap(), Err(BridgeError::PermissionDenied));
        assert_eq!(handle.authorization_requests(), 0);
        assert_eq!(handle.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_change_without_pending_is_noop() {
        let (mut gate, handle) = gate(AuthorizationState::Granted);
        gate.on_authorization_changed(AuthorizationState::Granted);
        gate.on_authorization_changed(AuthorizationState::Denied);
        assert!(!gate.has_pending());
        assert_eq!(handle.access_point_queries(), 0);
    }

    #[tokio::test]
    async fn test_dropping_gate_releases_observer() {
        let (mut gate, handle) = gate(AuthorizationState::Undetermined);
        let (tx, rx) = oneshot::channel();
        gate.query(tx);
        drop(gate);
        assert_eq!(handle.observer_count(), 0);
        assert!(rx.await.is_err());
    }
}
