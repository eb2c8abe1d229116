//! Configuration for the network service agent.
//!
//! Configuration is layered with the `config` crate: an optional file
//! (format inferred from its extension) overridden by `NSC_`-prefixed
//! environment variables. Keys use the charm's kebab-case names
//! (`nsr-name`, `user-vdu-id`, ...); each key's environment variable is the
//! upper snake_case spelling (`NSC_NSR_NAME`, `NSC_USER_VDU_ID`, ...).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, File, FileFormat};
use nsc_action_client::{ApplicationLocator, HttpActionClientConfig};
use serde::Deserialize;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ns-agent/config.json";

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "NSC";

/// Every recognised configuration key.
pub const CONFIG_KEYS: &[&str] = &[
    "nsr-name",
    "user-vdu-id",
    "user-member-index",
    "policy-vdu-id",
    "policy-member-index",
    "juju-username",
    "juju-password",
    "orchestrator-url",
    "model",
    "action-timeout-secs",
    "compensation-action",
    "log-level",
];

/// A secret string that never shows up in logs.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Agent configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CharmConfig {
    /// Network service record name shared by both downstream applications.
    #[serde(default, rename = "nsr-name")]
    pub nsr_name: Option<String>,

    /// VDU id of the user-registration application.
    #[serde(default, rename = "user-vdu-id")]
    pub user_vdu_id: Option<String>,

    /// Member index of the user-registration application.
    #[serde(default, rename = "user-member-index")]
    pub user_member_index: Option<u32>,

    /// VDU id of the policy-enforcement application.
    #[serde(default, rename = "policy-vdu-id")]
    pub policy_vdu_id: Option<String>,

    /// Member index of the policy-enforcement application.
    #[serde(default, rename = "policy-member-index")]
    pub policy_member_index: Option<u32>,

    /// Orchestrator username.
    #[serde(default, rename = "juju-username")]
    pub juju_username: Option<String>,

    /// Orchestrator password.
    #[serde(default, rename = "juju-password")]
    pub juju_password: Option<Password>,

    /// Orchestrator API base URL.
    #[serde(default = "default_orchestrator_url", rename = "orchestrator-url")]
    pub orchestrator_url: String,

    /// Model the network service is deployed in.
    #[serde(default = "default_model")]
    pub model: String,

    /// Upper bound for each remote action, in seconds.
    #[serde(default = "default_action_timeout_secs", rename = "action-timeout-secs")]
    pub action_timeout_secs: u64,

    /// Action run on the user application to undo a registration when the
    /// policy cannot be applied. Unset means no rollback.
    #[serde(default, rename = "compensation-action")]
    pub compensation_action: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level", rename = "log-level")]
    pub log_level: String,
}

fn default_orchestrator_url() -> String {
    "http://127.0.0.1:17070".to_string()
}

fn default_model() -> String {
    "default".to_string()
}

fn default_action_timeout_secs() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CharmConfig {
    fn default() -> Self {
        Self {
            nsr_name: None,
            user_vdu_id: None,
            user_member_index: None,
            policy_vdu_id: None,
            policy_member_index: None,
            juju_username: None,
            juju_password: None,
            orchestrator_url: default_orchestrator_url(),
            model: default_model(),
            action_timeout_secs: default_action_timeout_secs(),
            compensation_action: None,
            log_level: default_log_level(),
        }
    }
}

/// Locators of the two downstream applications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locators {
    /// User-registration application.
    pub user: ApplicationLocator,

    /// Policy-enforcement application.
    pub policy: ApplicationLocator,
}

impl CharmConfig {
    /// Load configuration from `path` (or [`DEFAULT_CONFIG_PATH`]) and the
    /// environment.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        let builder = config::Config::builder().add_source(File::from(file).required(required));

        env_overrides(builder)?
            .build()
            .with_context(|| format!("failed to load configuration from {}", file.display()))?
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Parse configuration from a JSON document, ignoring the environment.
    pub fn from_json(json: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(File::from_str(json, FileFormat::Json))
            .build()
            .context("failed to parse configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Returns true if both orchestrator credentials are set.
    pub fn has_credentials(&self) -> bool {
        let user = self
            .juju_username
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        let secret = self.juju_password.as_ref().is_some_and(|p| !p.is_empty());
        user && secret
    }

    /// Names of the locator fields that are absent or unusable.
    ///
    /// A member index is unusable outside `1..=676`, the range the
    /// application-name suffix can encode.
    pub fn missing_locator_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !present(&self.nsr_name) {
            missing.push("nsr-name");
        }
        if !present(&self.user_vdu_id) {
            missing.push("user-vdu-id");
        }
        if !self.user_member_index.is_some_and(ApplicationLocator::valid_member_index) {
            missing.push("user-member-index");
        }
        if !present(&self.policy_vdu_id) {
            missing.push("policy-vdu-id");
        }
        if !self.policy_member_index.is_some_and(ApplicationLocator::valid_member_index) {
            missing.push("policy-member-index");
        }
        missing
    }

    /// Resolve both application locators.
    ///
    /// Fails with the names of every missing field. A resolved locator always
    /// yields an application name.
    pub fn locators(&self) -> Result<Locators, Vec<&'static str>> {
        let missing = self.missing_locator_fields();
        match (
            &self.nsr_name,
            &self.user_vdu_id,
            self.user_member_index,
            &self.policy_vdu_id,
            self.policy_member_index,
        ) {
            (Some(nsr), Some(user_vdu), Some(user_index), Some(policy_vdu), Some(policy_index))
                if missing.is_empty() =>
            {
                let user = ApplicationLocator::new(nsr.trim(), user_vdu.trim(), user_index);
                let policy = ApplicationLocator::new(nsr.trim(), policy_vdu.trim(), policy_index);
                let mut invalid = Vec::new();
                if user.application_name().is_err() {
                    invalid.extend(["user-vdu-id", "user-member-index"]);
                }
                if policy.application_name().is_err() {
                    invalid.extend(["policy-vdu-id", "policy-member-index"]);
                }
                if invalid.is_empty() {
                    Ok(Locators { user, policy })
                } else {
                    Err(invalid)
                }
            }
            _ => Err(missing),
        }
    }

    /// Upper bound for each remote action.
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    /// Compensating action, if one is configured.
    pub fn compensation_action(&self) -> Option<&str> {
        self.compensation_action
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }

    /// Connection settings for the HTTP action client.
    pub fn http_client_config(&self) -> HttpActionClientConfig {
        HttpActionClientConfig {
            base_url: self.orchestrator_url.clone(),
            model: self.model.clone(),
            username: self.juju_username.clone(),
            password: self.juju_password.as_ref().map(|p| p.expose().to_string()),
        }
    }
}

/// Environment variable name for a configuration key.
pub fn env_var_name(key: &str) -> String {
    format!("{}_{}", ENV_PREFIX, key.replace('-', "_").to_uppercase())
}

fn env_overrides(mut builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>> {
    for key in CONFIG_KEYS {
        if let Ok(value) = std::env::var(env_var_name(key)) {
            builder = builder
                .set_override(*key, value)
                .with_context(|| format!("invalid override for {}", key))?;
        }
    }
    Ok(builder)
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
