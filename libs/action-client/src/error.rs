//! Error types for remote action execution.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when deriving an application name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// A locator component is empty.
    #[error("locator field '{0}' cannot be empty")]
    EmptyField(&'static str),

    /// The member index is outside the range the naming scheme can encode.
    #[error("invalid member index {0}: must be between 1 and 676")]
    InvalidMemberIndex(u32),
}

/// Errors returned by a [`RemoteActionClient`](crate::RemoteActionClient).
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// The action did not finish within its time bound.
    #[error("action '{action}' on '{application}' timed out after {timeout:?}")]
    Timeout {
        application: String,
        action: String,
        timeout: Duration,
    },

    /// The action ran and reported failure.
    #[error("action '{action}' on '{application}' failed: {message}")]
    Failed {
        application: String,
        action: String,
        message: String,
    },

    /// The pending call was abandoned by the caller.
    #[error("action '{action}' on '{application}' was cancelled")]
    Cancelled { application: String, action: String },

    /// The orchestrator could not be reached or rejected the request.
    #[error("transport error: {0}")]
    Transport(String),

    /// The orchestrator answered with something that is not an action result.
    #[error("invalid action response: {0}")]
    InvalidResponse(String),

    /// The target application could not be resolved.
    #[error("invalid application locator: {0}")]
    Locator(#[from] LocatorError),
}

impl ActionError {
    /// Returns true if the call exceeded its time bound.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ActionError::Timeout { .. })
    }

    /// Returns true if the call was abandoned by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ActionError::Cancelled { .. })
    }
}
