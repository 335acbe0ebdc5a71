//! Call commands and the call state machine

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::call::{CallDirection, CallSession, CallState, UNKNOWN_REMOTE};
use crate::engine::{AudioDeviceType, DeclineReason, EngineCallState, EngineError, SessionHandle};
use crate::error::{BridgeError, BridgeResult};
use crate::events::BridgeEvent;

use super::actor::Actor;
use super::Reply;

/// What to do with a ringing call once the answer delay has passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AnswerAction {
    Accept,
    Decline,
}

impl fmt::Display for AnswerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerAction::Accept => f.write_str("accept"),
            AnswerAction::Decline => f.write_str("decline"),
        }
    }
}

/// An accept/decline whose delay has elapsed
#[derive(Debug)]
pub(crate) struct DeferredAnswer {
    pub session: SessionHandle,
    pub action: AnswerAction,
    pub reply: Reply<()>,
}

/// Turn host input into a call target
///
/// A scheme-less target gets `sip:`; a bare user (no scheme, no `@`) is also
/// completed with `domain` when one is known.
fn call_target(address: &str, domain: Option<&str>) -> BridgeResult<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(BridgeError::invalid_input("address is required"));
    }
    if address.starts_with("sip:") || address.starts_with("sips:") {
        return Ok(address.to_string());
    }
    match domain {
        Some(domain) if !address.contains('@') => Ok(format!("sip:{}@{}", address, domain)),
        _ => Ok(format!("sip:{}", address)),
    }
}

impl Actor {
    pub(super) fn make_call(&mut self, address: &str) -> BridgeResult<()> {
        let target = call_target(address, self.account_domain())?;
        let engine = self.adapter.running_engine()?;

        let target = engine
            .parse_address(&target)
            .map_err(|e| BridgeError::call_setup(e.to_string()))?;
        let handle = engine.invite(&target).map_err(|e| {
            error!(%target, error = %e, "invite rejected");
            BridgeError::call_setup(e.to_string())
        })?;

        if let Some(previous) = self.call.as_ref().filter(|call| !call.is_released()) {
            warn!(previous = %previous.handle, session = %handle, "new call supersedes the tracked session");
        }
        info!(session = %handle, %target, "outgoing call started");
        self.call = Some(CallSession::outgoing(handle, target.to_string()));
        Ok(())
    }

    pub(super) fn terminate_call(&mut self) -> BridgeResult<()> {
        let handle = match self.call.as_ref() {
            Some(call) if !call.is_released() => call.handle,
            _ => {
                debug!("terminate with no active call");
                return Ok(());
            }
        };

        let engine = self.adapter.running_engine()?;
        let result = match engine.terminate(handle) {
            Ok(()) => {
                info!(session = %handle, "call termination requested");
                Ok(())
            }
            Err(EngineError::UnknownSession { .. }) => {
                warn!(session = %handle, "engine lost the session, terminating all calls");
                engine
                    .terminate_all_calls()
                    .map_err(|e| BridgeError::termination(e.to_string()))
            }
            Err(e) => {
                error!(session = %handle, error = %e, "terminate rejected");
                Err(BridgeError::termination(e.to_string()))
            }
        };

        // A deferred accept/decline must not reach a call being torn down.
        if result.is_ok() {
            if let Some(call) = self.tracked_mut(handle) {
                call.termination_requested = true;
            }
        }
        result
    }

    /// Stop the ringtone, then accept/decline after the configured delay
    pub(super) fn answer(&mut self, action: AnswerAction, reply: Reply<()>) {
        let Some(handle) = self.ringing_session() else {
            debug!(%action, "no incoming call");
            let _ = reply.send(Err(BridgeError::NoIncomingCall));
            return;
        };

        let engine = match self.adapter.running_engine() {
            Ok(engine) => engine,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        engine.stop_ringing();

        if let Some(call) = self.tracked_mut(handle) {
            call.answer_pending = true;
        }

        let delay = self.config.answer_delay();
        if delay.is_zero() {
            let _ = reply.send(self.invoke_answer(handle, action));
            return;
        }

        debug!(session = %handle, %action, ?delay, "answer deferred");
        let deferred_tx = self.deferred_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let answer = DeferredAnswer {
                session: handle,
                action,
                reply,
            };
            if deferred_tx.send(answer).is_err() {
                debug!(session = %handle, "coordinator stopped before the answer was applied");
            }
        });
    }

    /// Apply an accept/decline whose delay has elapsed
    pub(super) fn resume_answer(&mut self, answer: DeferredAnswer) {
        let DeferredAnswer { session, action, reply } = answer;
        let still_ringing = self.tracked_mut(session).is_some_and(|call| call.is_ringing());
        let result = if still_ringing {
            self.invoke_answer(session, action)
        } else {
            warn!(%session, %action, "call stopped ringing during the answer delay");
            Err(BridgeError::NoIncomingCall)
        };
        let _ = reply.send(result);
    }

    fn invoke_answer(&mut self, session: SessionHandle, action: AnswerAction) -> BridgeResult<()> {
        let engine = self.adapter.running_engine()?;
        let result = match action {
            AnswerAction::Accept => engine.accept(session),
            AnswerAction::Decline => engine.decline(session, DeclineReason::Declined),
        };
        match result {
            Ok(()) => {
                info!(%session, %action, "incoming call answered");
                Ok(())
            }
            Err(e) => {
                error!(%session, %action, error = %e, "answer rejected");
                // Let the host try again
                if let Some(call) = self.tracked_mut(session) {
                    call.answer_pending = false;
                }
                Err(BridgeError::answer(e.to_string()))
            }
        }
    }

    /// Ringing session with no accept/decline already under way
    fn ringing_session(&self) -> Option<SessionHandle> {
        self.call
            .as_ref()
            .filter(|call| call.is_answerable())
            .map(|call| call.handle)
    }

    fn tracked_mut(&mut self, session: SessionHandle) -> Option<&mut CallSession> {
        self.call.as_mut().filter(|call| call.handle == session)
    }

    pub(super) fn set_mute(&mut self, mute: bool) -> BridgeResult<()> {
        let engine = self.adapter.running_engine()?;
        engine.set_mic_enabled(!mute);
        info!(mute, "microphone updated");
        Ok(())
    }

    pub(super) fn set_speaker(&mut self, speaker: bool) -> BridgeResult<()> {
        let wanted = if speaker {
            AudioDeviceType::Speaker
        } else {
            AudioDeviceType::Earpiece
        };

        let engine = self.adapter.running_engine()?;
        let devices = engine.audio_devices();
        match devices.iter().find(|device| device.device_type == wanted) {
            Some(device) => {
                engine.set_output_device(device);
                info!(device = %device.name, "audio output routed");
            }
            None => warn!(?wanted, "no matching audio device, output unchanged"),
        }
        Ok(())
    }

    /// Apply a call callback from the engine and report it
    pub(super) fn on_call_state_changed(
        &mut self,
        session: SessionHandle,
        state: EngineCallState,
        remote: Option<String>,
        message: String,
    ) {
        debug!(%session, %state, "call state callback");

        match state {
            EngineCallState::IncomingReceived => self.on_incoming(session, remote, message),
            EngineCallState::Released => {
                let tracked = self.call.as_ref().is_some_and(|call| call.handle == session);
                if tracked {
                    info!(%session, "call released");
                    self.call = None;
                } else {
                    debug!(%session, "release of an untracked session");
                }
                self.events.emit(BridgeEvent::call_state(
                    session,
                    state,
                    CallState::Released,
                    message,
                    None,
                ));
            }
            _ => {
                let call_state = match self.call.as_mut().filter(|call| call.handle == session) {
                    Some(call) => {
                        call.observe(state);
                        call.state
                    }
                    None => {
                        debug!(%session, %state, "state change of an untracked session");
                        CallState::from_engine(state, CallDirection::Outgoing)
                    }
                };
                self.events
                    .emit(BridgeEvent::call_state(session, state, call_state, message, None));
            }
        }
    }

    fn on_incoming(&mut self, session: SessionHandle, remote: Option<String>, message: String) {
        let from = remote.unwrap_or_else(|| UNKNOWN_REMOTE.to_string());

        let tracked = self
            .call
            .as_ref()
            .filter(|call| !call.is_released())
            .map(|call| call.handle);

        match tracked {
            Some(handle) if handle == session => {
                if let Some(call) = self.call.as_mut() {
                    call.observe(EngineCallState::IncomingReceived);
                }
            }
            Some(handle) => {
                warn!(%session, tracked = %handle, "incoming call while another is tracked, not adopted");
                self.events.emit(BridgeEvent::call_state(
                    session,
                    EngineCallState::IncomingReceived,
                    CallState::IncomingReceived,
                    message,
                    Some(from),
                ));
                return;
            }
            None => {
                info!(%session, %from, "incoming call");
                self.call = Some(CallSession::incoming(session, from.clone()));
            }
        }

        self.events.emit(BridgeEvent::call_state(
            session,
            EngineCallState::IncomingReceived,
            CallState::IncomingReceived,
            message,
            Some(from.clone()),
        ));
        self.events.emit(BridgeEvent::incoming_call(session, from));
    }
}
