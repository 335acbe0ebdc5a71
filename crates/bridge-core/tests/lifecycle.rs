//! Engine lifecycle owned by the coordinator

mod common;

use std::time::Duration;

use common::{test_config, wait_for, Harness};
use sipbridge_core::engine::EngineError;
use sipbridge_core::mock::EngineOp;
use sipbridge_core::{AuthorizationState, BridgeConfig, BridgeError, EngineOptions};

#[tokio::test]
async fn test_initialize_applies_options_once() {
    let options = EngineOptions {
        stun_enabled: false,
        user_agent: Some("Softphone/2.0".into()),
        ..EngineOptions::default()
    };
    let harness = Harness::spawn(
        test_config().with_engine_options(options.clone()),
        AuthorizationState::Granted,
    );

    harness.bridge.initialize().await.unwrap();
    harness.bridge.initialize().await.unwrap();

    let ops = harness.engine.ops();
    assert_eq!(ops.iter().filter(|op| **op == EngineOp::Start).count(), 1);
    assert_eq!(ops[0], EngineOp::Configure);
    assert_eq!(harness.engine.options(), Some(options));
    assert!(harness.engine.is_started());
}

#[tokio::test]
async fn test_engine_is_only_pumped_once_started() {
    let harness = Harness::spawn(test_config(), AuthorizationState::Granted);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(harness.engine.iterations(), 0);

    harness.bridge.initialize().await.unwrap();
    wait_for(|| harness.engine.iterations() >= 3).await;
}

#[tokio::test]
async fn test_start_failure_can_be_retried() {
    let harness = Harness::spawn(test_config(), AuthorizationState::Granted);
    harness.engine.fail_next(
        "start",
        EngineError::StartFailed {
            reason: "audio device busy".into(),
        },
    );

    let err = harness.bridge.initialize().await.unwrap_err();
    assert!(matches!(err, BridgeError::EngineStartError { .. }));
    assert!(err.to_string().contains("audio device busy"));

    harness.bridge.initialize().await.unwrap();
    assert!(harness.engine.is_started());
}

#[tokio::test]
async fn test_shutdown_stops_engine() {
    let harness = Harness::started(test_config()).await;
    harness.bridge.shutdown().await.unwrap();

    assert!(!harness.engine.is_started());
    assert_eq!(harness.engine.ops().last(), Some(&EngineOp::Stop));

    let err = harness.bridge.make_call("sip:bob@example.com").await.unwrap_err();
    assert!(matches!(err, BridgeError::Internal { .. }));
}

#[tokio::test]
async fn test_dropping_handles_stops_engine() {
    let harness = Harness::started(test_config()).await;
    let engine = harness.engine.clone();
    drop(harness);

    wait_for(|| !engine.is_started()).await;
    let stops = engine.ops().iter().filter(|op| **op == EngineOp::Stop).count();
    assert_eq!(stops, 1);
}

#[tokio::test]
async fn test_commands_without_engine_are_rejected() {
    let harness = Harness::spawn(test_config(), AuthorizationState::Granted);
    assert!(matches!(
        harness.bridge.set_mute(true).await,
        Err(BridgeError::NotInitialized { .. })
    ));
    assert!(matches!(
        harness.bridge.set_speaker(true).await,
        Err(BridgeError::NotInitialized { .. })
    ));
    assert!(matches!(
        harness.bridge.unregister().await,
        Err(BridgeError::NotInitialized { .. })
    ));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = BridgeConfig::new().with_tick_interval(Duration::ZERO);
    let (engine, _) = sipbridge_core::mock::MockEngine::new();
    let (platform, _) = sipbridge_core::mock::MockPlatform::new(AuthorizationState::Granted);
    let result = sipbridge_core::BridgeCoordinator::spawn(Box::new(engine), std::sync::Arc::new(platform), config);
    assert!(matches!(result, Err(BridgeError::InvalidInput { .. })));
}
