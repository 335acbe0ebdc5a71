//! Shared harness for coordinator integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;

use sipbridge_core::mock::{MockEngine, MockEngineHandle, MockPlatform, MockPlatformHandle};
use sipbridge_core::{AuthorizationState, BridgeConfig, BridgeCoordinator, BridgeEvent, EventStream};

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// A coordinator wired to mock collaborators
pub struct Harness {
    pub bridge: BridgeCoordinator,
    pub engine: MockEngineHandle,
    pub platform: MockPlatformHandle,
    pub events: EventStream,
}

/// Fast ticks, no answer delay
pub fn test_config() -> BridgeConfig {
    BridgeConfig::new()
        .with_tick_interval(Duration::from_millis(5))
        .with_answer_delay(Duration::ZERO)
}

impl Harness {
    /// Spawn a coordinator without starting the engine
    pub fn spawn(config: BridgeConfig, authorization: AuthorizationState) -> Self {
        let (engine, engine_handle) = MockEngine::new();
        let (platform, platform_handle) = MockPlatform::new(authorization);
        let bridge = BridgeCoordinator::spawn(Box::new(engine), Arc::new(platform), config)
            .expect("valid configuration");
        let events = bridge.subscribe();
        Self {
            bridge,
            engine: engine_handle,
            platform: platform_handle,
            events,
        }
    }

    /// Spawn a coordinator and start its engine
    pub async fn started(config: BridgeConfig) -> Self {
        let harness = Self::spawn(config, AuthorizationState::Granted);
        harness.bridge.initialize().await.expect("engine starts");
        harness
    }

    /// Started coordinator with `alice@example.com` registered
    pub async fn registered(config: BridgeConfig) -> Self {
        let mut harness = Self::started(config).await;
        harness
            .bridge
            .register("alice", Some("pw".to_string()), "example.com")
            .await
            .expect("account accepted");
        harness
            .engine
            .registration_state(sipbridge_core::engine::EngineRegistrationState::Ok, "Registration successful");
        harness.next_named("registrationStateChanged").await;
        harness
    }

    /// Next event of any kind
    pub async fn next_event(&mut self) -> BridgeEvent {
        tokio::time::timeout(WAIT, self.events.next())
            .await
            .expect("timed out waiting for an event")
            .expect("event stream ended")
            .expect("event stream lagged")
    }

    /// Next event called `name`, skipping others
    pub async fn next_named(&mut self, name: &str) -> BridgeEvent {
        loop {
            let event = self.next_event().await;
            if event.name() == name {
                return event;
            }
        }
    }

    /// Next `callStateChanged` event with the given status
    pub async fn next_call_status(&mut self, status: &str) -> BridgeEvent {
        loop {
            let event = self.next_named("callStateChanged").await;
            if event.status() == status {
                return event;
            }
        }
    }
}

/// Poll `condition` until it holds
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never became true");
}
