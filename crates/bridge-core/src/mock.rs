//! In-process engine and platform doubles
//!
//! [`MockEngine`] records every operation the coordinator submits and holds
//! back injected callbacks until the engine is iterated, the same way a real
//! engine only produces callbacks from its event loop. [`MockPlatform`]
//! models the authorization prompt and the access-point lookup.
//!
//! Both come paired with a cloneable handle that stays with the test (or the
//! demo) after the double itself has been moved into the coordinator.
//!
//! ```rust
//! use sipbridge_core::engine::{EngineCallState, SipEngine};
//! use sipbridge_core::mock::{EngineOp, MockEngine};
//!
//! let (mut engine, handle) = MockEngine::new();
//! engine.set_mic_enabled(false);
//! assert_eq!(handle.ops(), vec![EngineOp::SetMicEnabled(false)]);
//!
//! let session = handle.incoming_call("sip:bob@example.com");
//! handle.call_state(session, EngineCallState::Released);
//! assert_eq!(handle.queued_events(), 2);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::access_point::{AccessPointPlatform, AuthorizationSink, AuthorizationState, ObserverId, PlatformError};
use crate::config::EngineOptions;
use crate::engine::{
    AccountId, AccountParams, AudioDevice, AudioDeviceType, Credentials, DeclineReason, EngineCallState, EngineError,
    EngineEvent, EngineEventSink, EngineRegistrationState, EngineResult, SessionHandle, SipAddress, SipEngine,
};

/// An operation the coordinator submitted to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    Configure,
    Start,
    Stop,
    AddAuthInfo { username: String, has_password: bool },
    AddAccount { identity: String, server: String },
    SetDefaultAccount(AccountId),
    ClearAccounts,
    ClearAuthInfo,
    Invite(String),
    StopRinging,
    Accept(SessionHandle),
    Decline(SessionHandle, DeclineReason),
    Terminate(SessionHandle),
    TerminateAll,
    SetMicEnabled(bool),
    SetOutputDevice(AudioDeviceType),
}

#[derive(Debug)]
struct EngineState {
    ops: Vec<EngineOp>,
    options: Option<EngineOptions>,
    sink: Option<EngineEventSink>,
    queued: VecDeque<EngineEvent>,
    failures: HashMap<String, EngineError>,
    iterations: u64,
    next_id: u64,
    accounts: Vec<AccountId>,
    default_account: Option<AccountId>,
    auth_users: Vec<String>,
    sessions: HashSet<SessionHandle>,
    last_invite: Option<SessionHandle>,
    devices: Vec<AudioDevice>,
    output_device: Option<AudioDevice>,
    mic_enabled: bool,
}

impl EngineState {
    fn new() -> Self {
        Self {
            ops: Vec::new(),
            options: None,
            sink: None,
            queued: VecDeque::new(),
            failures: HashMap::new(),
            iterations: 0,
            next_id: 1,
            accounts: Vec::new(),
            default_account: None,
            auth_users: Vec::new(),
            sessions: HashSet::new(),
            last_invite: None,
            devices: vec![
                AudioDevice::new("earpiece", "Earpiece", AudioDeviceType::Earpiece),
                AudioDevice::new("speaker", "Speaker", AudioDeviceType::Speaker),
                AudioDevice::new("mic", "Built-in Microphone", AudioDeviceType::Microphone),
            ],
            output_device: None,
            mic_enabled: true,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check(&mut self, operation: &str) -> EngineResult<()> {
        match self.failures.remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Scriptable [`SipEngine`]
#[derive(Debug)]
pub struct MockEngine {
    state: Arc<Mutex<EngineState>>,
}

/// Test-side view of a [`MockEngine`]
#[derive(Debug, Clone)]
pub struct MockEngineHandle {
    state: Arc<Mutex<EngineState>>,
}

impl MockEngine {
    pub fn new() -> (Self, MockEngineHandle) {
        let state = Arc::new(Mutex::new(EngineState::new()));
        (Self { state: state.clone() }, MockEngineHandle { state })
    }
}

impl SipEngine for MockEngine {
    fn configure(&mut self, options: &EngineOptions) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::Configure);
        state.check("configure")?;
        state.options = Some(options.clone());
        Ok(())
    }

    fn start(&mut self, sink: EngineEventSink) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::Start);
        state.check("start")?;
        state.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::Stop);
        state.sink = None;
    }

    fn iterate(&mut self) {
        let (sink, events) = {
            let mut state = self.state.lock();
            state.iterations += 1;
            let Some(sink) = state.sink.clone() else {
                return;
            };
            let events: Vec<EngineEvent> = state.queued.drain(..).collect();
            (sink, events)
        };
        for event in events {
            sink.deliver(event);
        }
    }

    fn add_auth_info(&mut self, credentials: Credentials) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::AddAuthInfo {
            username: credentials.username.clone(),
            has_password: credentials.password.is_some(),
        });
        state.check("add_auth_info")?;
        state.auth_users.push(credentials.username);
        Ok(())
    }

    fn add_account(&mut self, params: AccountParams) -> EngineResult<AccountId> {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::AddAccount {
            identity: params.identity.to_string(),
            server: params.server.to_string(),
        });
        state.check("add_account")?;
        let account = AccountId(state.next_id());
        state.accounts.push(account);
        Ok(account)
    }

    fn set_default_account(&mut self, account: AccountId) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::SetDefaultAccount(account));
        state.check("set_default_account")?;
        if !state.accounts.contains(&account) {
            return Err(EngineError::rejected("set_default_account", format!("unknown {}", account)));
        }
        state.default_account = Some(account);
        Ok(())
    }

    fn clear_accounts(&mut self) {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::ClearAccounts);
        state.accounts.clear();
        state.default_account = None;
    }

    fn clear_all_auth_info(&mut self) {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::ClearAuthInfo);
        state.auth_users.clear();
    }

    fn invite(&mut self, address: &SipAddress) -> EngineResult<SessionHandle> {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::Invite(address.to_string()));
        state.check("invite")?;
        let session = SessionHandle(state.next_id());
        state.sessions.insert(session);
        state.last_invite = Some(session);
        Ok(session)
    }

    fn stop_ringing(&mut self) {
        self.state.lock().ops.push(EngineOp::StopRinging);
    }

    fn accept(&mut self, session: SessionHandle) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::Accept(session));
        state.check("accept")
    }

    fn decline(&mut self, session: SessionHandle, reason: DeclineReason) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::Decline(session, reason));
        state.check("decline")
    }

    fn terminate(&mut self, session: SessionHandle) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::Terminate(session));
        state.check("terminate")?;
        if !state.sessions.contains(&session) {
            return Err(EngineError::UnknownSession { session });
        }
        Ok(())
    }

    fn terminate_all_calls(&mut self) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::TerminateAll);
        state.check("terminate_all_calls")
    }

    fn set_mic_enabled(&mut self, enabled: bool) {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::SetMicEnabled(enabled));
        state.mic_enabled = enabled;
    }

    fn audio_devices(&self) -> Vec<AudioDevice> {
        self.state.lock().devices.clone()
    }

    fn set_output_device(&mut self, device: &AudioDevice) {
        let mut state = self.state.lock();
        state.ops.push(EngineOp::SetOutputDevice(device.device_type));
        state.output_device = Some(device.clone());
    }
}

impl MockEngineHandle {
    /// Every operation submitted so far, oldest first
    pub fn ops(&self) -> Vec<EngineOp> {
        self.state.lock().ops.clone()
    }

    /// Number of times the engine loop was pumped
    pub fn iterations(&self) -> u64 {
        self.state.lock().iterations
    }

    /// Whether the engine is started and has a callback sink
    pub fn is_started(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// Options applied by the last `configure`
    pub fn options(&self) -> Option<EngineOptions> {
        self.state.lock().options.clone()
    }

    /// Make the next call of `operation` fail with `error`
    ///
    /// Operation names are the [`SipEngine`] method names, e.g. `"invite"`.
    pub fn fail_next(&self, operation: &str, error: EngineError) {
        self.state.lock().failures.insert(operation.to_string(), error);
    }

    /// Accounts currently known to the engine
    pub fn accounts(&self) -> Vec<AccountId> {
        self.state.lock().accounts.clone()
    }

    /// Usernames with credentials stored in the engine
    pub fn auth_users(&self) -> Vec<String> {
        self.state.lock().auth_users.clone()
    }

    pub fn default_account(&self) -> Option<AccountId> {
        self.state.lock().default_account
    }

    pub fn mic_enabled(&self) -> bool {
        self.state.lock().mic_enabled
    }

    /// Device audio was last routed to
    pub fn output_device(&self) -> Option<AudioDevice> {
        self.state.lock().output_device.clone()
    }

    /// Replace the devices the engine enumerates
    pub fn set_devices(&self, devices: Vec<AudioDevice>) {
        self.state.lock().devices = devices;
    }

    /// Callbacks waiting for the next iteration
    pub fn queued_events(&self) -> usize {
        self.state.lock().queued.len()
    }

    /// Queue an arbitrary callback
    pub fn push_event(&self, event: EngineEvent) {
        self.state.lock().queued.push_back(event);
    }

    /// Queue a registration callback for the most recently added account
    pub fn registration_state(&self, state: EngineRegistrationState, message: &str) {
        let account = self.state.lock().accounts.last().copied().unwrap_or(AccountId(0));
        self.registration_state_for(account, state, message);
    }

    /// Queue a registration callback for a specific account
    pub fn registration_state_for(&self, account: AccountId, state: EngineRegistrationState, message: &str) {
        self.push_event(EngineEvent::RegistrationStateChanged {
            account,
            state,
            message: message.to_string(),
        });
    }

    /// Queue an incoming call from `remote`; returns its handle
    pub fn incoming_call(&self, remote: &str) -> SessionHandle {
        self.incoming(Some(remote.to_string()))
    }

    /// Queue an incoming call whose caller the engine cannot name
    pub fn anonymous_call(&self) -> SessionHandle {
        self.incoming(None)
    }

    fn incoming(&self, remote: Option<String>) -> SessionHandle {
        let mut state = self.state.lock();
        let session = SessionHandle(state.next_id());
        state.sessions.insert(session);
        state.queued.push_back(EngineEvent::CallStateChanged {
            session,
            state: EngineCallState::IncomingReceived,
            remote,
            message: "Incoming call".to_string(),
        });
        session
    }

    /// Queue a call state callback. `Released` also makes the engine forget the session.
    pub fn call_state(&self, session: SessionHandle, call_state: EngineCallState) {
        let mut state = self.state.lock();
        if call_state == EngineCallState::Released {
            state.sessions.remove(&session);
        }
        state.queued.push_back(EngineEvent::CallStateChanged {
            session,
            state: call_state,
            remote: None,
            message: call_state.to_string(),
        });
    }

    /// Drop a session from the engine without any callback
    pub fn forget_session(&self, session: SessionHandle) {
        self.state.lock().sessions.remove(&session);
    }

    /// The session most recently created by `invite`
    pub fn last_invite(&self) -> Option<SessionHandle> {
        self.state.lock().last_invite
    }
}

#[derive(Debug)]
struct PlatformState {
    authorization: AuthorizationState,
    prompt_answer: Option<AuthorizationState>,
    requests: usize,
    observers: HashMap<ObserverId, AuthorizationSink>,
    next_observer: u64,
    access_point: Result<String, PlatformError>,
    queries: usize,
}

/// Scriptable [`AccessPointPlatform`]
#[derive(Debug)]
pub struct MockPlatform {
    state: Arc<Mutex<PlatformState>>,
}

/// Test-side view of a [`MockPlatform`]
#[derive(Debug, Clone)]
pub struct MockPlatformHandle {
    state: Arc<Mutex<PlatformState>>,
}

impl MockPlatform {
    /// A platform whose authorization starts at `authorization`
    ///
    /// The access-point lookup fails with [`PlatformError::NotConnected`]
    /// until a result is configured.
    pub fn new(authorization: AuthorizationState) -> (Self, MockPlatformHandle) {
        let state = Arc::new(Mutex::new(PlatformState {
            authorization,
            prompt_answer: None,
            requests: 0,
            observers: HashMap::new(),
            next_observer: 1,
            access_point: Err(PlatformError::NotConnected),
            queries: 0,
        }));
        (Self { state: state.clone() }, MockPlatformHandle { state })
    }

    fn notify(state: &Arc<Mutex<PlatformState>>, authorization: AuthorizationState) {
        let sinks: Vec<AuthorizationSink> = {
            let mut state = state.lock();
            state.authorization = authorization;
            state.observers.values().cloned().collect()
        };
        for sink in sinks {
            sink.authorization_changed(authorization);
        }
    }
}

#[async_trait]
impl AccessPointPlatform for MockPlatform {
    fn authorization_state(&self) -> AuthorizationState {
        self.state.lock().authorization
    }

    fn request_authorization(&self) {
        let answer = {
            let mut state = self.state.lock();
            state.requests += 1;
            state.prompt_answer
        };
        if let Some(answer) = answer {
            Self::notify(&self.state, answer);
        }
    }

    fn add_authorization_observer(&self, sink: AuthorizationSink) -> ObserverId {
        let mut state = self.state.lock();
        let id = ObserverId(state.next_observer);
        state.next_observer += 1;
        state.observers.insert(id, sink);
        id
    }

    fn remove_authorization_observer(&self, id: ObserverId) {
        self.state.lock().observers.remove(&id);
    }

    async fn current_access_point(&self) -> Result<String, PlatformError> {
        let mut state = self.state.lock();
        state.queries += 1;
        state.access_point.clone()
    }
}

impl MockPlatformHandle {
    /// Change the authorization and notify every observer, as a user
    /// answering the prompt would
    pub fn set_authorization(&self, authorization: AuthorizationState) {
        MockPlatform::notify(&self.state, authorization);
    }

    /// Answer every future prompt with `answer` as soon as it is shown
    pub fn answer_prompts_with(&self, answer: AuthorizationState) {
        self.state.lock().prompt_answer = Some(answer);
    }

    /// Result of the next access-point lookups
    pub fn set_access_point(&self, result: Result<String, PlatformError>) {
        self.state.lock().access_point = result;
    }

    /// Number of authorization prompts shown
    pub fn authorization_requests(&self) -> usize {
        self.state.lock().requests
    }

    /// Number of registered authorization observers
    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Number of access-point lookups performed
    pub fn access_point_queries(&self) -> usize {
        self.state.lock().queries
    }
}
