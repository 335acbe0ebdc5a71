//! Account registration state
//!
//! The coordinator tracks at most one account. Its [`RegistrationState`]
//! only moves when the engine reports a registration callback; host commands
//! create or destroy the account but never set its state directly.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{AccountId, EngineRegistrationState, SipAddress};

/// Registration state of the active account
///
/// ```rust
/// use sipbridge_core::RegistrationState;
/// use sipbridge_core::engine::EngineRegistrationState;
///
/// let state = RegistrationState::from_engine(EngineRegistrationState::Ok, "Registration successful");
/// assert_eq!(state, RegistrationState::Registered);
/// assert_eq!(state.to_string(), "Registered");
///
/// let failed = RegistrationState::from_engine(EngineRegistrationState::Failed, "403 Forbidden");
/// assert_eq!(failed.failure_reason(), Some("403 Forbidden"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    /// Not registered (never attempted, or cleared)
    None,
    /// A REGISTER is outstanding or being refreshed
    InProgress,
    /// The registrar accepted the account
    Registered,
    /// The registrar or transport rejected the account
    Failed { reason: String },
}

impl RegistrationState {
    /// Map an engine report onto the coordinator's model
    pub fn from_engine(state: EngineRegistrationState, message: &str) -> Self {
        match state {
            EngineRegistrationState::None | EngineRegistrationState::Cleared => RegistrationState::None,
            EngineRegistrationState::Progress | EngineRegistrationState::Refreshing => RegistrationState::InProgress,
            EngineRegistrationState::Ok => RegistrationState::Registered,
            EngineRegistrationState::Failed => RegistrationState::Failed {
                reason: message.to_string(),
            },
        }
    }

    /// Name reported to the host
    pub fn name(&self) -> &'static str {
        match self {
            RegistrationState::None => "None",
            RegistrationState::InProgress => "InProgress",
            RegistrationState::Registered => "Registered",
            RegistrationState::Failed { .. } => "Failed",
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationState::Registered)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            RegistrationState::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The account submitted by the last `register` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRegistration {
    /// Engine handle of the account
    pub account: AccountId,
    pub username: String,
    pub domain: String,
    /// `sip:<username>@<domain>`
    pub identity: SipAddress,
    /// Last state observed from the engine
    pub state: RegistrationState,
    pub created_at: DateTime<Utc>,
    /// When the last registration callback was applied
    pub updated_at: Option<DateTime<Utc>>,
}

impl AccountRegistration {
    pub fn new(account: AccountId, username: String, domain: String, identity: SipAddress) -> Self {
        Self {
            account,
            username,
            domain,
            identity,
            state: RegistrationState::None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Record a state reported by the engine
    pub(crate) fn apply(&mut self, state: RegistrationState) {
        self.state = state;
        self.updated_at = Some(Utc::now());
    }
}
