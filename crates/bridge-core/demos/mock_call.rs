//! Scripted softphone session against the in-process mock engine
//!
//! This demo:
//! 1. Starts the engine and registers an account
//! 2. Receives an incoming call, accepts it after the answer delay, hangs up
//! 3. Routes audio to the speaker and mutes mid-call
//! 4. Reads the current access-point identifier behind an authorization prompt
//!
//! Every host-visible event is printed as `name -> payload`.
//!
//! ```text
//! cargo run -p sipbridge-core --example mock_call -- --caller sip:1001@example.com
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_stream::StreamExt;
use tracing::info;

use sipbridge_core::engine::{EngineCallState, EngineRegistrationState};
use sipbridge_core::mock::{MockEngine, MockPlatform};
use sipbridge_core::{dispatch, AuthorizationState, BridgeConfig, BridgeCoordinator, PluginCall, PluginOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scripted bridge session on a mock engine", long_about = None)]
struct Args {
    /// Username to register
    #[arg(short, long, default_value = "alice")]
    username: String,

    /// SIP domain of the account
    #[arg(short, long, default_value = "example.com")]
    domain: String,

    /// Remote party of the simulated incoming call
    #[arg(short, long, default_value = "sip:1001@example.com")]
    caller: String,

    /// Delay between stopping the ringtone and answering, in milliseconds
    #[arg(long, default_value = "100")]
    answer_delay_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("sipbridge_core={}", log_level).parse()?)
                .add_directive("mock_call=info".parse()?),
        )
        .init();

    let (engine, engine_handle) = MockEngine::new();
    let (platform, platform_handle) = MockPlatform::new(AuthorizationState::Undetermined);
    platform_handle.answer_prompts_with(AuthorizationState::Granted);
    platform_handle.set_access_point(Ok("d8:ec:5e:d5:cb:56".to_string()));

    let config = BridgeConfig::new()
        .with_answer_delay(Duration::from_millis(args.answer_delay_ms))
        .with_event_buffer(64);
    let bridge = BridgeCoordinator::spawn(Box::new(engine), Arc::new(platform), config)?;

    let mut events = bridge.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => println!("{} -> {}", event.name(), event.payload()),
                Err(e) => println!("listener lagged: {}", e),
            }
        }
    });

    call(&bridge, "initialize", serde_json::json!({})).await;
    call(
        &bridge,
        "register",
        serde_json::json!({ "username": args.username, "password": "secret", "domain": args.domain }),
    )
    .await;
    engine_handle.registration_state(EngineRegistrationState::Progress, "Registration in progress");
    engine_handle.registration_state(EngineRegistrationState::Ok, "Registration successful");
    tokio::time::sleep(Duration::from_millis(100)).await;
    call(&bridge, "getRegistrationStatus", serde_json::json!({})).await;

    let session = engine_handle.incoming_call(&args.caller);
    tokio::time::sleep(Duration::from_millis(100)).await;
    call(&bridge, "acceptCall", serde_json::json!({})).await;
    engine_handle.call_state(session, EngineCallState::Connected);
    engine_handle.call_state(session, EngineCallState::StreamsRunning);
    tokio::time::sleep(Duration::from_millis(100)).await;

    call(&bridge, "setSpeaker", serde_json::json!({ "speaker": true })).await;
    call(&bridge, "setMute", serde_json::json!({ "mute": true })).await;
    call(&bridge, "getCurrentBssid", serde_json::json!({})).await;

    call(&bridge, "hangUp", serde_json::json!({})).await;
    engine_handle.call_state(session, EngineCallState::End);
    engine_handle.call_state(session, EngineCallState::Released);
    tokio::time::sleep(Duration::from_millis(100)).await;

    call(&bridge, "unregister", serde_json::json!({})).await;
    bridge.shutdown().await.context("shutting down the coordinator")?;
    drop(bridge);
    printer.await?;

    info!(operations = engine_handle.ops().len(), "demo finished");
    Ok(())
}

async fn call(bridge: &BridgeCoordinator, method: &str, options: serde_json::Value) {
    let outcome = PluginOutcome::from(dispatch(bridge, PluginCall::new(method, options)).await);
    println!("{} => {}", method, outcome.to_json());
}
