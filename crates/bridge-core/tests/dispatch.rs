//! Host method dispatch end to end

mod common;

use common::{test_config, Harness};
use serde_json::json;
use sipbridge_core::engine::EngineRegistrationState;
use sipbridge_core::mock::EngineOp;
use sipbridge_core::{dispatch, AuthorizationState, BridgeError, PluginCall, PluginOutcome};

#[tokio::test]
async fn test_unknown_method() {
    let harness = Harness::spawn(test_config(), AuthorizationState::Granted);
    let err = dispatch(&harness.bridge, PluginCall::new("transfer", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::invalid_input("unknown method 'transfer'"));
}

#[tokio::test]
async fn test_register_and_call_through_dispatch() {
    let mut harness = Harness::spawn(test_config(), AuthorizationState::Granted);
    let bridge = harness.bridge.clone();

    assert_eq!(
        dispatch(&bridge, PluginCall::new("initialize", json!(null))).await.unwrap(),
        json!({})
    );

    let ack = dispatch(
        &bridge,
        PluginCall::new(
            "register",
            json!({ "username": "alice", "password": "pw", "domain": "example.com" }),
        ),
    )
    .await
    .unwrap();
    assert_eq!(ack, json!({ "message": "Registration in progress..." }));

    let status = dispatch(&bridge, PluginCall::new("getRegistrationStatus", json!({})))
        .await
        .unwrap();
    assert_eq!(status, json!({ "state": "None" }));

    harness.engine.registration_state(EngineRegistrationState::Failed, "401 Unauthorized");
    harness.next_named("registrationStateChanged").await;
    let status = dispatch(&bridge, PluginCall::new("getRegistrationStatus", json!({})))
        .await
        .unwrap();
    assert_eq!(status, json!({ "state": "Failed", "reason": "401 Unauthorized" }));

    let err = dispatch(&bridge, PluginCall::new("makeCall", json!({}))).await.unwrap_err();
    assert!(matches!(err, BridgeError::InvalidInput { .. }));

    dispatch(&bridge, PluginCall::new("makeCall", json!({ "address": "bob" })))
        .await
        .unwrap();
    let session = harness.engine.last_invite().unwrap();
    assert!(harness
        .engine
        .ops()
        .contains(&EngineOp::Invite("sip:bob@example.com".into())));

    dispatch(&bridge, PluginCall::new("hangUp", json!(null))).await.unwrap();
    assert!(harness.engine.ops().contains(&EngineOp::Terminate(session)));
}

#[tokio::test]
async fn test_mute_and_speaker_options() {
    let harness = Harness::started(test_config()).await;
    let bridge = &harness.bridge;

    dispatch(bridge, PluginCall::new("setMute", json!({ "mute": true }))).await.unwrap();
    assert!(!harness.engine.mic_enabled());

    // A missing flag means "off"
    dispatch(bridge, PluginCall::new("setMute", json!(null))).await.unwrap();
    assert!(harness.engine.mic_enabled());

    let err = dispatch(bridge, PluginCall::new("setSpeaker", json!({ "speaker": "yes" })))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidInput { .. }));

    dispatch(bridge, PluginCall::new("setSpeaker", json!({ "speaker": true }))).await.unwrap();
    assert!(harness.engine.ops().iter().any(|op| matches!(op, EngineOp::SetOutputDevice(_))));
}

#[tokio::test]
async fn test_access_point_method_names() {
    let harness = Harness::spawn(test_config(), AuthorizationState::Granted);
    harness.platform.set_access_point(Ok("aa:bb:cc:dd:ee:ff".into()));

    let id = dispatch(&harness.bridge, PluginCall::new("getCurrentAccessPointId", json!({})))
        .await
        .unwrap();
    assert_eq!(id, json!({ "id": "aa:bb:cc:dd:ee:ff" }));

    let bssid = dispatch(&harness.bridge, PluginCall::new("getCurrentBssid", json!({})))
        .await
        .unwrap();
    assert_eq!(bssid, json!({ "bssid": "aa:bb:cc:dd:ee:ff" }));
}

#[tokio::test]
async fn test_rejections_render_with_code() {
    let harness = Harness::started(test_config()).await;

    let outcome = PluginOutcome::from(dispatch(&harness.bridge, PluginCall::new("acceptCall", json!({}))).await);
    assert!(!outcome.is_resolved());
    assert_eq!(
        outcome.to_json(),
        json!({ "rejected": "No incoming call", "code": "call" })
    );

    let outcome = PluginOutcome::from(dispatch(&harness.bridge, PluginCall::new("terminateCall", json!({}))).await);
    assert_eq!(outcome.to_json(), json!({ "resolved": {} }));
}

#[tokio::test]
async fn test_events_carry_listener_names() {
    let mut harness = Harness::started(test_config()).await;
    harness.engine.incoming_call("sip:1001@example.com");

    let event = harness.next_event().await;
    assert_eq!(event.name(), "callStateChanged");
    let payload = event.payload();
    assert_eq!(payload["state"], "Call");
    assert_eq!(payload["status"], "IncomingReceived");
    assert_eq!(payload["incomingFrom"], "sip:1001@example.com");
    assert!(payload["timestamp"].is_string());

    let event = harness.next_event().await;
    assert_eq!(event.name(), "incomingCall");
}
