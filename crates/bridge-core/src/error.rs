//! Error types for the bridge coordinator
//!
//! Every host command resolves to either a value or a [`BridgeError`]. The
//! variants map one-to-one onto the rejection reasons a host sees, and each
//! renders as a human-readable detail string through `Display`.
//!
//! Asynchronous engine failures (a registration that eventually fails, a call
//! that drops) are *not* errors of the command that started them; they arrive
//! later on the event stream.
//!
//! # Example
//!
//! ```rust
//! use sipbridge_core::BridgeError;
//!
//! let err = BridgeError::registration("invalid identity address");
//! assert_eq!(err.category(), "registration");
//! assert_eq!(err.to_string(), "Registration failed: invalid identity address");
//! ```

use thiserror::Error;

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors reported to the host for a rejected command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The engine has not been started, or no account exists yet
    #[error("Not initialized: {detail}")]
    NotInitialized { detail: String },

    /// The engine rejected one of the registration construction steps
    #[error("Registration failed: {detail}")]
    RegistrationError { detail: String },

    /// The engine refused to terminate the current call
    #[error("Failed to terminate call: {detail}")]
    TerminationError { detail: String },

    /// accept/decline issued without a ringing incoming call
    #[error("No incoming call")]
    NoIncomingCall,

    /// The engine rejected an outgoing call
    #[error("Failed to make call: {detail}")]
    CallSetupError { detail: String },

    /// The engine rejected accept/decline of the incoming call
    #[error("Failed to answer call: {detail}")]
    AnswerError { detail: String },

    /// The engine could not be configured or started
    #[error("Failed to start engine: {detail}")]
    EngineStartError { detail: String },

    /// The access-point query ran but produced no identifier
    #[error("Access point unavailable: {detail}")]
    QueryUnavailable { detail: String },

    /// The platform denied (or restricts) the authorization the query needs
    #[error("Location permission not granted")]
    PermissionDenied,

    /// A query is already waiting on an authorization decision
    #[error("An access point query is already in progress")]
    QueryAlreadyInProgress,

    /// A command is missing a required field or carries a malformed one
    #[error("Invalid input: {detail}")]
    InvalidInput { detail: String },

    /// The coordinator task is gone
    #[error("Internal error: {detail}")]
    Internal { detail: String },
}

impl BridgeError {
    /// Create a not-initialized error
    pub fn not_initialized(detail: impl Into<String>) -> Self {
        Self::NotInitialized { detail: detail.into() }
    }

    /// Create a registration error
    pub fn registration(detail: impl Into<String>) -> Self {
        Self::RegistrationError { detail: detail.into() }
    }

    /// Create a termination error
    pub fn termination(detail: impl Into<String>) -> Self {
        Self::TerminationError { detail: detail.into() }
    }

    /// Create a call setup error
    pub fn call_setup(detail: impl Into<String>) -> Self {
        Self::CallSetupError { detail: detail.into() }
    }

    /// Create an answer error
    pub fn answer(detail: impl Into<String>) -> Self {
        Self::AnswerError { detail: detail.into() }
    }

    /// Create an engine start error
    pub fn engine_start(detail: impl Into<String>) -> Self {
        Self::EngineStartError { detail: detail.into() }
    }

    /// Create a query-unavailable error
    pub fn query_unavailable(detail: impl Into<String>) -> Self {
        Self::QueryUnavailable { detail: detail.into() }
    }

    /// Create an invalid-input error
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::InvalidInput { detail: detail.into() }
    }

    /// Create an internal error
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal { detail: detail.into() }
    }

    /// Whether the error stems from calling a command in the wrong state
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            BridgeError::NotInitialized { .. }
                | BridgeError::NoIncomingCall
                | BridgeError::QueryAlreadyInProgress
        )
    }

    /// Whether the error is an authorization refusal
    pub fn is_permission_error(&self) -> bool {
        matches!(self, BridgeError::PermissionDenied)
    }

    /// Error category for logging and host-side error codes
    pub fn category(&self) -> &'static str {
        match self {
            BridgeError::NotInitialized { .. } | BridgeError::EngineStartError { .. } => "lifecycle",

            BridgeError::RegistrationError { .. } => "registration",

            BridgeError::TerminationError { .. }
            | BridgeError::NoIncomingCall
            | BridgeError::CallSetupError { .. }
            | BridgeError::AnswerError { .. } => "call",

            BridgeError::QueryUnavailable { .. }
            | BridgeError::PermissionDenied
            | BridgeError::QueryAlreadyInProgress => "access_point",

            BridgeError::InvalidInput { .. } => "input",

            BridgeError::Internal { .. } => "internal",
        }
    }
}
