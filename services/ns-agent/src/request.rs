//! Provisioning request and result types.
//!
//! These are the values crossing the `add-user` action surface:
//!
//! ```text
//! params:  {"username": "alice", "bw": 100, "qos": "gold", "tariff": "premium"}
//! result:  {"user-id": 42, "policy-set": true}
//! ```

use nsc_action_client::{ActionOutput, ActionParams};
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, RegistrationFailure};

/// Output field carrying the id assigned by the user-registration application.
pub const USER_ID_FIELD: &str = "user-id";

/// Handle of a registered user. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// Create a user id; zero is the registration failure sentinel and is
    /// rejected.
    pub fn new(id: u64) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Extract the user id from an `add-user` action output.
    ///
    /// Accepts a JSON integer or a decimal string. Strings may carry
    /// surrounding whitespace and a leading `+` (`" 19 "`, `"+3"`); anything
    /// that does not parse to a positive integer is rejected.
    pub fn from_registration_output(output: &ActionOutput) -> Result<Self, RegistrationFailure> {
        let value = output
            .get(USER_ID_FIELD)
            .ok_or(RegistrationFailure::MissingUserId)?;

        let parsed = match value {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };

        parsed
            .and_then(|id| u64::try_from(id).ok())
            .and_then(UserId::new)
            .ok_or_else(|| RegistrationFailure::InvalidUserId(value.to_string()))
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request to provision one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Subscriber name registered with the user application.
    pub username: String,

    /// Bandwidth limit applied by the policy application.
    #[serde(rename = "bw")]
    pub bandwidth_limit: u64,

    /// Quality-of-service class.
    #[serde(rename = "qos")]
    pub qos_class: String,

    /// Billing tariff.
    pub tariff: String,
}

impl ProvisionRequest {
    pub fn new(
        username: impl Into<String>,
        bandwidth_limit: u64,
        qos_class: impl Into<String>,
        tariff: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            bandwidth_limit,
            qos_class: qos_class.into(),
            tariff: tariff.into(),
        }
    }

    /// Parse and validate action parameters.
    pub fn from_params(params: &serde_json::Value) -> Result<Self, ProvisionError> {
        let request: ProvisionRequest = serde_json::from_value(params.clone())
            .map_err(|e| ProvisionError::InvalidRequest(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    /// Reject requests with blank text fields.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        for (field, value) in [
            ("username", &self.username),
            ("qos", &self.qos_class),
            ("tariff", &self.tariff),
        ] {
            if value.trim().is_empty() {
                return Err(ProvisionError::InvalidRequest(format!(
                    "{} cannot be empty",
                    field
                )));
            }
        }
        Ok(())
    }

    /// Parameters for the `add-user` action.
    pub fn registration_params(&self) -> ActionParams {
        let mut params = ActionParams::new();
        params.insert("username".to_string(), self.username.clone().into());
        params.insert("tariff".to_string(), self.tariff.clone().into());
        params
    }

    /// Parameters for the `set-policy` action.
    pub fn policy_params(&self, user_id: UserId) -> ActionParams {
        let mut params = ActionParams::new();
        params.insert("user_id".to_string(), user_id.get().into());
        params.insert("bw".to_string(), self.bandwidth_limit.into());
        params.insert("qos".to_string(), self.qos_class.clone().into());
        params
    }
}

/// Outcome of a provisioning run whose registration succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionResult {
    #[serde(rename = "user-id")]
    pub user_id: UserId,

    #[serde(rename = "policy-set")]
    pub policy_set: bool,

    /// A compensating action removed the user again.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub compensated: bool,

    /// Why the policy phase failed, when it did.
    #[serde(skip)]
    pub policy_failure: Option<ProvisionError>,
}

impl ProvisionResult {
    /// Render the action result payload.
    pub fn to_payload(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}
