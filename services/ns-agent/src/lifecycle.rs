//! Lifecycle hook and action dispatch.
//!
//! The orchestrator runs the agent once per event. Hooks and actions are
//! routed through explicit tables from event name to handler; handlers
//! only touch unit status and the provisioning coordinator.
//!
//! | Event            | Effect                                                  |
//! |------------------|---------------------------------------------------------|
//! | `install`        | none                                                    |
//! | `upgrade-charm`  | `maintenance` → install → `active`                      |
//! | `config-changed` | `waiting` → `active` or `blocked` (credentials, locators) |
//! | action `add-user`| two-phase provisioning                                  |

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use nsc_action_client::RemoteActionClient;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::CharmConfig;
use crate::coordinator::{Cancellation, ProvisioningCoordinator};
use crate::error::ProvisionError;
use crate::request::ProvisionRequest;
use crate::status::{StatusReporter, UnitStatus};

/// Name of the subscriber provisioning action.
pub const ADD_USER: &str = "add-user";

/// Lifecycle hooks the agent reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    Install,
    UpgradeCharm,
    ConfigChanged,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Install => "install",
            HookEvent::UpgradeCharm => "upgrade-charm",
            HookEvent::ConfigChanged => "config-changed",
        }
    }
}

impl FromStr for HookEvent {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(HookEvent::Install),
            "upgrade-charm" => Ok(HookEvent::UpgradeCharm),
            "config-changed" => Ok(HookEvent::ConfigChanged),
            other => Err(LifecycleError::UnknownEvent(other.to_string())),
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while dispatching an event.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No handler exists for the hook.
    #[error("unknown hook: {0}")]
    UnknownEvent(String),

    /// No handler exists for the action.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The unit status could not be published.
    #[error("status update failed: {0}")]
    Status(#[from] anyhow::Error),
}

/// Result of running an action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Result payload to publish.
    Completed(serde_json::Map<String, serde_json::Value>),
    /// Failure message to publish.
    Failed(String),
}

type HandlerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LifecycleError>> + Send + 'a>>;

type HookHandler = for<'a> fn(&'a LifecycleController) -> HandlerFuture<'a, ()>;

type ActionHandler = for<'a> fn(
    &'a LifecycleController,
    &'a serde_json::Value,
    Cancellation,
) -> HandlerFuture<'a, ActionOutcome>;

static HOOK_HANDLERS: &[(HookEvent, HookHandler)] = &[
    (HookEvent::Install, on_install as HookHandler),
    (HookEvent::UpgradeCharm, on_upgrade_charm as HookHandler),
    (HookEvent::ConfigChanged, on_config_changed as HookHandler),
];

static ACTION_HANDLERS: &[(&str, ActionHandler)] = &[(ADD_USER, on_add_user as ActionHandler)];

/// Routes lifecycle hooks and actions to their handlers.
pub struct LifecycleController {
    config: Arc<CharmConfig>,
    status: Arc<dyn StatusReporter>,
    coordinator: ProvisioningCoordinator,
}

impl LifecycleController {
    /// Create a controller; the coordinator shares `config` and `client`.
    pub fn new(
        config: Arc<CharmConfig>,
        status: Arc<dyn StatusReporter>,
        client: Arc<dyn RemoteActionClient>,
    ) -> Self {
        let coordinator = ProvisioningCoordinator::new(Arc::clone(&config), client);
        Self::with_coordinator(config, status, coordinator)
    }

    /// Create a controller around an existing coordinator.
    pub fn with_coordinator(
        config: Arc<CharmConfig>,
        status: Arc<dyn StatusReporter>,
        coordinator: ProvisioningCoordinator,
    ) -> Self {
        Self {
            config,
            status,
            coordinator,
        }
    }

    /// Run the handler registered for `event`.
    pub async fn handle_hook(&self, event: HookEvent) -> Result<(), LifecycleError> {
        let handler = HOOK_HANDLERS
            .iter()
            .find(|(registered, _)| *registered == event)
            .map(|(_, handler)| *handler)
            .ok_or_else(|| LifecycleError::UnknownEvent(event.to_string()))?;

        info!(hook = %event, "Dispatching hook");
        handler(self).await
    }

    /// Run the action called `name` with `params`.
    pub async fn run_action(
        &self,
        name: &str,
        params: &serde_json::Value,
        cancel: Cancellation,
    ) -> Result<ActionOutcome, LifecycleError> {
        let handler = ACTION_HANDLERS
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, handler)| *handler)
            .ok_or_else(|| LifecycleError::UnknownAction(name.to_string()))?;

        info!(action = name, "Dispatching action");
        handler(self, params, cancel).await
    }

    async fn set_status(&self, status: UnitStatus) -> Result<(), LifecycleError> {
        info!(status = %status, "Setting unit status");
        self.status.set_status(status).await?;
        Ok(())
    }
}

fn on_install(_ctl: &LifecycleController) -> HandlerFuture<'_, ()> {
    Box::pin(async move {
        info!("Install complete");
        Ok(())
    })
}

fn on_upgrade_charm(ctl: &LifecycleController) -> HandlerFuture<'_, ()> {
    Box::pin(async move {
        ctl.set_status(UnitStatus::maintenance("Upgrading charm"))
            .await?;
        on_install(ctl).await?;
        ctl.set_status(UnitStatus::active()).await
    })
}

fn on_config_changed(ctl: &LifecycleController) -> HandlerFuture<'_, ()> {
    Box::pin(async move {
        ctl.set_status(UnitStatus::waiting("Waiting for Juju credentials"))
            .await?;

        if !ctl.config.has_credentials() {
            warn!("Orchestrator credentials are not configured");
            return ctl
                .set_status(UnitStatus::blocked("Invalid Juju credentials."))
                .await;
        }

        let missing = ctl.config.missing_locator_fields();
        if !missing.is_empty() {
            warn!(missing = ?missing, "Application locators are not configured");
            return ctl
                .set_status(UnitStatus::blocked(format!(
                    "Missing configuration: {}",
                    missing.join(", ")
                )))
                .await;
        }

        ctl.set_status(UnitStatus::active()).await
    })
}

fn on_add_user<'a>(
    ctl: &'a LifecycleController,
    params: &'a serde_json::Value,
    cancel: Cancellation,
) -> HandlerFuture<'a, ActionOutcome> {
    Box::pin(async move {
        let request = match ProvisionRequest::from_params(params) {
            Ok(request) => request,
            Err(e) => return Ok(ActionOutcome::Failed(e.to_string())),
        };

        let outcome = match ctl.coordinator.provision_with_cancel(&request, cancel).await {
            Ok(result) => ActionOutcome::Completed(result.to_payload()),
            Err(ProvisionError::RegistrationFailed(reason)) => {
                ActionOutcome::Failed(format!("user_id is 0; add_user failed: {}", reason))
            }
            Err(e) => ActionOutcome::Failed(e.to_string()),
        };
        Ok(outcome)
    })
}
