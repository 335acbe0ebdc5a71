//! Coordinator task: message loop, lifecycle and registration
//!
//! Call handling lives in `calls.rs` as a second `impl Actor` block.

use std::ops::ControlFlow;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::access_point::{AccessPointGate, AuthorizationState};
use crate::call::CallSession;
use crate::config::BridgeConfig;
use crate::engine::{AccountId, AccountParams, Credentials, EngineAdapter, EngineEvent, EngineRegistrationState};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{BridgeEvent, EventEmitter};
use crate::registration::{AccountRegistration, RegistrationState};

use super::calls::{AnswerAction, DeferredAnswer};
use super::{Command, RegisterRequest, REGISTRATION_IN_PROGRESS};

/// State owned by the coordinator task
pub(super) struct Actor {
    pub(super) config: BridgeConfig,
    pub(super) adapter: EngineAdapter,
    pub(super) gate: AccessPointGate,
    pub(super) events: EventEmitter,
    pub(super) account: Option<AccountRegistration>,
    pub(super) call: Option<CallSession>,
    pub(super) deferred_tx: mpsc::UnboundedSender<DeferredAnswer>,
}

impl Actor {
    pub(super) fn new(
        config: BridgeConfig,
        adapter: EngineAdapter,
        gate: AccessPointGate,
        events: EventEmitter,
    ) -> (Self, mpsc::UnboundedReceiver<DeferredAnswer>) {
        let (deferred_tx, deferred_rx) = mpsc::unbounded_channel();
        let actor = Self {
            config,
            adapter,
            gate,
            events,
            account: None,
            call: None,
            deferred_tx,
        };
        (actor, deferred_rx)
    }

    /// Process messages until shutdown or until every handle is dropped
    pub(super) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        mut authorization: mpsc::UnboundedReceiver<AuthorizationState>,
        mut deferred: mpsc::UnboundedReceiver<DeferredAnswer>,
    ) {
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                Some(event) = engine_events.recv() => self.on_engine_event(event),

                Some(state) = authorization.recv() => {
                    debug!(%state, "authorization changed");
                    self.gate.on_authorization_changed(state);
                }

                Some(answer) = deferred.recv() => self.resume_answer(answer),

                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!("all coordinator handles dropped");
                        break;
                    }
                },

                _ = ticker.tick(), if self.adapter.is_running() => self.adapter.tick(),
            }
        }

        self.adapter.stop();
        info!("bridge coordinator stopped");
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Shutdown { reply } => {
                info!("shutdown requested");
                self.adapter.stop();
                let _ = reply.send(Ok(()));
                return ControlFlow::Break(());
            }
            Command::Initialize { reply } => {
                let _ = reply.send(self.initialize());
            }
            Command::Register { request, reply } => {
                let _ = reply.send(self.register(request));
            }
            Command::Unregister { reply } => {
                let _ = reply.send(self.unregister());
            }
            Command::RegistrationStatus { reply } => {
                let _ = reply.send(self.registration_status());
            }
            Command::MakeCall { address, reply } => {
                let _ = reply.send(self.make_call(&address));
            }
            Command::TerminateCall { reply } => {
                let _ = reply.send(self.terminate_call());
            }
            Command::AcceptCall { reply } => self.answer(AnswerAction::Accept, reply),
            Command::DeclineCall { reply } => self.answer(AnswerAction::Decline, reply),
            Command::SetMute { mute, reply } => {
                let _ = reply.send(self.set_mute(mute));
            }
            Command::SetSpeaker { speaker, reply } => {
                let _ = reply.send(self.set_speaker(speaker));
            }
            Command::AccessPointId { reply } => self.gate.query(reply),
            Command::CurrentCall { reply } => {
                let _ = reply.send(Ok(self.call.clone()));
            }
        }
        ControlFlow::Continue(())
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::RegistrationStateChanged { account, state, message } => {
                self.on_registration_state_changed(account, state, message)
            }
            EngineEvent::CallStateChanged {
                session,
                state,
                remote,
                message,
            } => self.on_call_state_changed(session, state, remote, message),
        }
    }

    fn initialize(&mut self) -> BridgeResult<()> {
        if self.adapter.is_running() {
            debug!("initialize called on a running engine");
            return Ok(());
        }
        self.adapter.start().map_err(|e| {
            error!(error = %e, "engine failed to start");
            e
        })
    }

    fn register(&mut self, request: RegisterRequest) -> BridgeResult<String> {
        let engine = self.adapter.running_engine()?;

        let username = request.username.trim();
        let domain = request.domain.trim();
        if username.is_empty() {
            return Err(BridgeError::invalid_input("username is required"));
        }
        if domain.is_empty() {
            return Err(BridgeError::invalid_input("domain is required"));
        }

        let identity = engine
            .parse_address(&format!("sip:{}@{}", username, domain))
            .map_err(|e| BridgeError::registration(e.to_string()))?;
        let server = engine
            .parse_address(&format!("sip:{}", domain))
            .map_err(|e| BridgeError::registration(e.to_string()))?;

        // One account at a time: drop whatever the engine still holds
        if let Some(previous) = self.account.take() {
            info!(identity = %previous.identity, "replacing registered account");
        }
        engine.clear_accounts();
        engine.clear_all_auth_info();

        engine
            .add_auth_info(Credentials {
                username: username.to_string(),
                password: request.password.clone(),
                domain: domain.to_string(),
            })
            .map_err(|e| BridgeError::registration(e.to_string()))?;

        let submitted = engine.add_account(AccountParams {
            identity: identity.clone(),
            server,
            register_enabled: true,
        });
        let account = match submitted.and_then(|account| engine.set_default_account(account).map(|()| account)) {
            Ok(account) => account,
            Err(e) => {
                warn!(%identity, error = %e, "account rejected, rolling back");
                engine.clear_accounts();
                engine.clear_all_auth_info();
                return Err(BridgeError::registration(e.to_string()));
            }
        };

        info!(%identity, %account, "account submitted for registration");
        self.account = Some(AccountRegistration::new(
            account,
            username.to_string(),
            domain.to_string(),
            identity,
        ));
        Ok(REGISTRATION_IN_PROGRESS.to_string())
    }

    fn unregister(&mut self) -> BridgeResult<()> {
        let engine = self.adapter.running_engine()?;
        engine.clear_accounts();
        engine.clear_all_auth_info();

        match self.account.take() {
            Some(account) => info!(identity = %account.identity, "account removed"),
            None => debug!("unregister with no active account"),
        }
        Ok(())
    }

    fn registration_status(&self) -> BridgeResult<RegistrationState> {
        self.account
            .as_ref()
            .map(|account| account.state.clone())
            .ok_or_else(|| BridgeError::not_initialized("no account has been registered"))
    }

    fn on_registration_state_changed(&mut self, account: AccountId, state: EngineRegistrationState, message: String) {
        let new_state = RegistrationState::from_engine(state, &message);

        match self.account.as_mut() {
            Some(active) if active.account == account => {
                info!(%account, from = %active.state, to = %new_state, "registration state changed");
                active.apply(new_state.clone());
            }
            _ => warn!(%account, state = %new_state, "registration callback for an inactive account"),
        }

        self.events.emit(BridgeEvent::registration(new_state, message));
    }

    /// Domain of the active account, used to complete bare call targets
    pub(super) fn account_domain(&self) -> Option<&str> {
        self.account.as_ref().map(|account| account.domain.as_str())
    }
}
