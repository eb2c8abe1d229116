//! Error types for subscriber provisioning.

use nsc_action_client::ActionError;
use serde::Serialize;
use thiserror::Error;

use crate::coordinator::ProvisionPhase;
use crate::request::UserId;

/// Coarse classification of provisioning failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationMissing,
    InvalidRequest,
    RegistrationFailed,
    PolicyFailed,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::ConfigurationMissing => write!(f, "configuration_missing"),
            ErrorKind::InvalidRequest => write!(f, "invalid_request"),
            ErrorKind::RegistrationFailed => write!(f, "registration_failed"),
            ErrorKind::PolicyFailed => write!(f, "policy_failed"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why the user-registration phase failed.
#[derive(Debug, Error, Clone)]
pub enum RegistrationFailure {
    /// The action output had no `user-id` field.
    #[error("output has no user-id")]
    MissingUserId,

    /// The `user-id` field was not a positive integer.
    #[error("user-id {0} is not a positive integer")]
    InvalidUserId(String),

    /// The remote call itself failed.
    #[error(transparent)]
    Remote(ActionError),
}

/// Why the policy phase failed.
#[derive(Debug, Error, Clone)]
pub enum PolicyFailure {
    /// The action reported an explicit negative verdict.
    #[error("policy rejected ({0})")]
    Rejected(String),

    /// The action reported a verdict that is neither true nor false.
    #[error("ambiguous policy verdict ({0})")]
    Ambiguous(String),

    /// The action completed without producing any output.
    #[error("set-policy returned no output")]
    EmptyOutput,

    /// The remote call itself failed.
    #[error(transparent)]
    Remote(ActionError),
}

/// Errors produced by the provisioning coordinator.
#[derive(Debug, Error, Clone)]
pub enum ProvisionError {
    /// Required locator configuration is absent.
    #[error("configuration missing: {}", fields.join(", "))]
    ConfigurationMissing { fields: Vec<&'static str> },

    /// The action parameters could not be turned into a request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No valid user id was obtained; the policy phase never ran.
    #[error("registration failed: {0}")]
    RegistrationFailed(RegistrationFailure),

    /// The user was registered but the policy was not applied.
    #[error("policy not set for user {user_id}: {reason}")]
    PolicyFailed {
        user_id: UserId,
        reason: PolicyFailure,
    },

    /// The caller cancelled a pending remote call.
    #[error("provisioning cancelled while {phase}")]
    Cancelled {
        phase: ProvisionPhase,
        user_id: Option<UserId>,
        /// A compensating action removed the registered user again.
        compensated: bool,
    },
}

impl ProvisionError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::ConfigurationMissing { .. } => ErrorKind::ConfigurationMissing,
            ProvisionError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ProvisionError::RegistrationFailed(_) => ErrorKind::RegistrationFailed,
            ProvisionError::PolicyFailed { .. } => ErrorKind::PolicyFailed,
            ProvisionError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Returns true if the failure was caused by a remote call exceeding its
    /// time bound, as opposed to a rejection by the remote application.
    pub fn timed_out(&self) -> bool {
        match self {
            ProvisionError::RegistrationFailed(RegistrationFailure::Remote(e)) => e.is_timeout(),
            ProvisionError::PolicyFailed {
                reason: PolicyFailure::Remote(e),
                ..
            } => e.is_timeout(),
            _ => false,
        }
    }
}
