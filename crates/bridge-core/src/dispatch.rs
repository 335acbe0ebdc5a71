//! JSON command dispatch for host bridges
//!
//! Hosts that speak a plugin protocol send a method name plus a JSON options
//! object and expect a resolve/reject answer. [`dispatch`] maps those names
//! onto [`BridgeCoordinator`] methods; [`PluginOutcome`] renders the answer.
//!
//! | Method | Options | Resolves with |
//! |--------|---------|---------------|
//! | `initialize` | | `{}` |
//! | `register` | `{ username, password?, domain }` | `{ message }` |
//! | `unregister` | | `{}` |
//! | `getRegistrationStatus` | | `{ state, reason? }` |
//! | `makeCall` | `{ address }` | `{}` |
//! | `terminateCall`, `hangUp` | | `{}` |
//! | `acceptCall`, `declineCall` | | `{}` |
//! | `setMute` | `{ mute }` | `{}` |
//! | `setSpeaker` | `{ speaker }` | `{}` |
//! | `getCurrentAccessPointId` | | `{ id }` |
//! | `getCurrentBssid` | | `{ bssid }` |

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::coordinator::BridgeCoordinator;
use crate::error::{BridgeError, BridgeResult};

/// One named invocation from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginCall {
    pub method: String,
    #[serde(default)]
    pub options: Value,
}

impl PluginCall {
    pub fn new(method: impl Into<String>, options: Value) -> Self {
        Self {
            method: method.into(),
            options,
        }
    }

    fn options<T: DeserializeOwned>(&self) -> BridgeResult<T> {
        let options = if self.options.is_null() {
            json!({})
        } else {
            self.options.clone()
        };
        serde_json::from_value(options)
            .map_err(|e| BridgeError::invalid_input(format!("{}: {}", self.method, e)))
    }
}

#[derive(Debug, Deserialize)]
struct RegisterOptions {
    username: String,
    #[serde(default)]
    password: Option<String>,
    domain: String,
}

#[derive(Debug, Deserialize)]
struct CallOptions {
    address: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MuteOptions {
    mute: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpeakerOptions {
    speaker: bool,
}

/// Route `call` to the coordinator
pub async fn dispatch(bridge: &BridgeCoordinator, call: PluginCall) -> BridgeResult<Value> {
    debug!(method = %call.method, "dispatching host call");

    match call.method.as_str() {
        "initialize" => bridge.initialize().await.map(|_| json!({})),
        "register" => {
            let options: RegisterOptions = call.options()?;
            let message = bridge
                .register(options.username, options.password, options.domain)
                .await?;
            Ok(json!({ "message": message }))
        }
        "unregister" => bridge.unregister().await.map(|_| json!({})),
        "getRegistrationStatus" => {
            let state = bridge.registration_status().await?;
            let mut answer = json!({ "state": state.name() });
            if let Some(reason) = state.failure_reason() {
                answer["reason"] = json!(reason);
            }
            Ok(answer)
        }
        "makeCall" => {
            let options: CallOptions = call.options()?;
            bridge.make_call(options.address).await.map(|_| json!({}))
        }
        "terminateCall" | "hangUp" => bridge.terminate_call().await.map(|_| json!({})),
        "acceptCall" => bridge.accept_call().await.map(|_| json!({})),
        "declineCall" => bridge.decline_call().await.map(|_| json!({})),
        "setMute" => {
            let options: MuteOptions = call.options()?;
            bridge.set_mute(options.mute).await.map(|_| json!({}))
        }
        "setSpeaker" => {
            let options: SpeakerOptions = call.options()?;
            bridge.set_speaker(options.speaker).await.map(|_| json!({}))
        }
        "getCurrentAccessPointId" => {
            let id = bridge.current_access_point_id().await?;
            Ok(json!({ "id": id }))
        }
        "getCurrentBssid" => {
            let id = bridge.current_access_point_id().await?;
            Ok(json!({ "bssid": id }))
        }
        other => Err(BridgeError::invalid_input(format!("unknown method '{}'", other))),
    }
}

/// Resolve/reject answer in the shape plugin hosts expect
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PluginOutcome {
    Resolved { resolved: Value },
    Rejected { rejected: String, code: String },
}

impl PluginOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, PluginOutcome::Resolved { .. })
    }

    /// The outcome as a JSON value
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<BridgeResult<Value>> for PluginOutcome {
    fn from(result: BridgeResult<Value>) -> Self {
        match result {
            Ok(resolved) => PluginOutcome::Resolved { resolved },
            Err(e) => PluginOutcome::Rejected {
                rejected: e.to_string(),
                code: e.category().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_options_use_defaults() {
        let call = PluginCall::new("setMute", Value::Null);
        let options: MuteOptions = call.options().unwrap();
        assert!(!options.mute);
    }

    #[test]
    fn test_missing_field_is_invalid_input() {
        let call = PluginCall::new("register", json!({ "username": "alice" }));
        let err = call.options::<RegisterOptions>().unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput { .. }));
        assert!(err.to_string().contains("domain"));
    }

    #[test]
    fn test_outcome_rendering() {
        let resolved = PluginOutcome::from(Ok(json!({ "id": "aa:bb" })));
        assert!(resolved.is_resolved());
        assert_eq!(resolved.to_json(), json!({ "resolved": { "id": "aa:bb" } }));

        let rejected = PluginOutcome::from(Err(BridgeError::NoIncomingCall));
        assert_eq!(
            rejected.to_json(),
            json!({ "rejected": "No incoming call", "code": "call" })
        );
    }

    #[test]
    fn test_plugin_call_from_json() {
        let call: PluginCall = serde_json::from_str(r#"{ "method": "acceptCall" }"#).unwrap();
        assert_eq!(call.method, "acceptCall");
        assert!(call.options.is_null());
    }
}
