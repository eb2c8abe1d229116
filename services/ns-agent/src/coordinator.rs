//! Two-phase subscriber provisioning.
//!
//! A provisioning run registers the user with the user-registration
//! application, then applies the QoS policy on the policy-enforcement
//! application using the id the first phase returned:
//!
//! ```text
//! Start -> Registering -> RegisterFailed
//!                      -> Registered -> SettingPolicy -> PolicySucceeded
//!                                                     -> PolicyFailed
//! ```
//!
//! Nothing is retried. A registration failure ends the run before the policy
//! application is contacted. A policy failure is reported on the result but
//! the registration stays in place unless a compensating action is
//! configured. The same compensating action runs when the caller cancels
//! while the policy is being set. Each remote call is bounded by the configured action timeout
//! and can be abandoned through a [`Cancellation`].

use std::sync::Arc;
use std::time::Duration;

use nsc_action_client::{ActionError, ActionOutput, ActionParams, ApplicationLocator, RemoteActionClient};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use ulid::Ulid;

use crate::config::CharmConfig;
use crate::error::{PolicyFailure, ProvisionError, RegistrationFailure};
use crate::request::{ProvisionRequest, ProvisionResult, UserId};

/// Action registering a user on the user-registration application.
pub const ADD_USER_ACTION: &str = "add-user";

/// Action applying a policy on the policy-enforcement application.
pub const SET_POLICY_ACTION: &str = "set-policy";

/// Output keys that carry an explicit `set-policy` verdict, in priority order.
const POLICY_FLAG_KEYS: [&str; 3] = ["success", "policy-set", "result"];

/// Slack on top of the action timeout before the coordinator gives up on a
/// client that does not honour its own bound.
const DEFAULT_CALL_GRACE: Duration = Duration::from_secs(5);

/// Progress of a single provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionPhase {
    Start,
    Registering,
    RegisterFailed,
    Registered,
    SettingPolicy,
    PolicySucceeded,
    PolicyFailed,
    Cancelled,
}

impl ProvisionPhase {
    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisionPhase::RegisterFailed
                | ProvisionPhase::PolicySucceeded
                | ProvisionPhase::PolicyFailed
                | ProvisionPhase::Cancelled
        )
    }

    /// Returns true if `next` directly follows this phase.
    pub fn can_advance_to(&self, next: ProvisionPhase) -> bool {
        use ProvisionPhase::*;
        matches!(
            (self, next),
            (Start, Registering)
                | (Registering, RegisterFailed)
                | (Registering, Registered)
                | (Registering, Cancelled)
                | (Registered, SettingPolicy)
                | (SettingPolicy, PolicySucceeded)
                | (SettingPolicy, PolicyFailed)
                | (SettingPolicy, Cancelled)
        )
    }
}

impl std::fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProvisionPhase::Start => "start",
            ProvisionPhase::Registering => "registering",
            ProvisionPhase::RegisterFailed => "register_failed",
            ProvisionPhase::Registered => "registered",
            ProvisionPhase::SettingPolicy => "setting_policy",
            ProvisionPhase::PolicySucceeded => "policy_succeeded",
            ProvisionPhase::PolicyFailed => "policy_failed",
            ProvisionPhase::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

fn advance(phase: &mut ProvisionPhase, next: ProvisionPhase) {
    debug_assert!(
        phase.can_advance_to(next),
        "invalid provisioning transition {phase} -> {next}"
    );
    debug!(from = %phase, to = %next, "Provisioning phase transition");
    *phase = next;
}

/// Caller-side cancellation signal for a provisioning run.
///
/// Fires once the paired sender publishes `true`. A dropped sender never
/// cancels.
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Wrap an existing shutdown-style receiver.
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Create a sender and its paired signal.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::new(rx))
    }

    /// Returns true if cancellation has already been requested.
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolve once cancellation is requested.
    async fn cancelled(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

/// Why a single remote call did not produce output.
enum CallError {
    Action(ActionError),
    Cancelled,
}

/// Sequences the two provisioning phases against the downstream applications.
pub struct ProvisioningCoordinator {
    /// Read-only agent configuration.
    config: Arc<CharmConfig>,

    /// Client used for both phases.
    client: Arc<dyn RemoteActionClient>,

    /// Slack on top of the action timeout.
    call_grace: Duration,
}

impl ProvisioningCoordinator {
    /// Create a new coordinator.
    pub fn new(config: Arc<CharmConfig>, client: Arc<dyn RemoteActionClient>) -> Self {
        Self {
            config,
            client,
            call_grace: DEFAULT_CALL_GRACE,
        }
    }

    /// Override the slack granted to clients beyond the action timeout.
    pub fn with_call_grace(mut self, grace: Duration) -> Self {
        self.call_grace = grace;
        self
    }

    /// Provision a subscriber.
    pub async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionResult, ProvisionError> {
        self.provision_with_cancel(request, Cancellation::never())
            .await
    }

    /// Provision a subscriber, abandoning the pending remote call if `cancel`
    /// fires.
    pub async fn provision_with_cancel(
        &self,
        request: &ProvisionRequest,
        mut cancel: Cancellation,
    ) -> Result<ProvisionResult, ProvisionError> {
        let operation_id = Ulid::new();
        let span = info_span!(
            "provision",
            operation_id = %operation_id,
            username = %request.username
        );
        self.run(request, &mut cancel).instrument(span).await
    }

    async fn run(
        &self,
        request: &ProvisionRequest,
        cancel: &mut Cancellation,
    ) -> Result<ProvisionResult, ProvisionError> {
        let locators = self.config.locators().map_err(|fields| {
            error!(missing = ?fields, "Cannot provision without application locators");
            ProvisionError::ConfigurationMissing { fields }
        })?;
        let timeout = self.config.action_timeout();
        let mut phase = ProvisionPhase::Start;

        advance(&mut phase, ProvisionPhase::Registering);
        let registration = self
            .call(
                &locators.user,
                ADD_USER_ACTION,
                request.registration_params(),
                timeout,
                cancel,
            )
            .await;

        let user_id = match registration {
            Ok(output) => UserId::from_registration_output(&output),
            Err(CallError::Action(e)) => Err(RegistrationFailure::Remote(e)),
            Err(CallError::Cancelled) => {
                advance(&mut phase, ProvisionPhase::Cancelled);
                warn!("Provisioning cancelled during registration");
                return Err(ProvisionError::Cancelled {
                    phase: ProvisionPhase::Registering,
                    user_id: None,
                    compensated: false,
                });
            }
        };
        let user_id = match user_id {
            Ok(id) => id,
            Err(reason) => {
                advance(&mut phase, ProvisionPhase::RegisterFailed);
                warn!(error = %reason, "User registration failed");
                return Err(ProvisionError::RegistrationFailed(reason));
            }
        };
        advance(&mut phase, ProvisionPhase::Registered);
        info!(user_id = %user_id, "User registered");

        advance(&mut phase, ProvisionPhase::SettingPolicy);
        let policy = self
            .call(
                &locators.policy,
                SET_POLICY_ACTION,
                request.policy_params(user_id),
                timeout,
                cancel,
            )
            .await;

        let verdict = match policy {
            Ok(output) => policy_verdict(&output),
            Err(CallError::Action(e)) => Err(PolicyFailure::Remote(e)),
            Err(CallError::Cancelled) => {
                advance(&mut phase, ProvisionPhase::Cancelled);
                warn!(user_id = %user_id, "Provisioning cancelled while setting policy");
                // Runs under its own bound; the fired signal is not consulted.
                let compensated = self.compensate(&locators.user, user_id, timeout).await;
                return Err(ProvisionError::Cancelled {
                    phase: ProvisionPhase::SettingPolicy,
                    user_id: Some(user_id),
                    compensated,
                });
            }
        };

        match verdict {
            Ok(()) => {
                advance(&mut phase, ProvisionPhase::PolicySucceeded);
                info!(
                    user_id = %user_id,
                    bw = request.bandwidth_limit,
                    qos = %request.qos_class,
                    "Policy set"
                );
                Ok(ProvisionResult {
                    user_id,
                    policy_set: true,
                    compensated: false,
                    policy_failure: None,
                })
            }
            Err(reason) => {
                advance(&mut phase, ProvisionPhase::PolicyFailed);
                warn!(user_id = %user_id, error = %reason, "Policy not set");
                let compensated = self.compensate(&locators.user, user_id, timeout).await;
                Ok(ProvisionResult {
                    user_id,
                    policy_set: false,
                    compensated,
                    policy_failure: Some(ProvisionError::PolicyFailed { user_id, reason }),
                })
            }
        }
    }

    /// Run one remote action, bounded by `timeout` plus grace and by `cancel`.
    async fn call(
        &self,
        locator: &ApplicationLocator,
        action: &str,
        params: ActionParams,
        timeout: Duration,
        cancel: &mut Cancellation,
    ) -> Result<ActionOutput, CallError> {
        if cancel.is_cancelled() {
            return Err(CallError::Cancelled);
        }

        let bound = timeout + self.call_grace;
        let execution = self.client.execute_action(locator, action, params, timeout);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CallError::Cancelled),
            result = tokio::time::timeout(bound, execution) => match result {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) if e.is_cancelled() => Err(CallError::Cancelled),
                Ok(Err(e)) => Err(CallError::Action(e)),
                Err(_) => {
                    warn!(locator = %locator, action, "Remote action exceeded its bound");
                    Err(CallError::Action(ActionError::Timeout {
                        application: locator
                            .application_name()
                            .unwrap_or_else(|_| locator.to_string()),
                        action: action.to_string(),
                        timeout,
                    }))
                }
            },
        }
    }

    /// Undo a registration after the policy phase failed.
    ///
    /// Returns true if the compensating action completed.
    async fn compensate(
        &self,
        locator: &ApplicationLocator,
        user_id: UserId,
        timeout: Duration,
    ) -> bool {
        let Some(action) = self.config.compensation_action() else {
            debug!(user_id = %user_id, "No compensating action configured, registration kept");
            return false;
        };

        let mut params = ActionParams::new();
        params.insert("user_id".to_string(), user_id.get().into());

        let execution = self.client.execute_action(locator, action, params, timeout);
        match tokio::time::timeout(timeout + self.call_grace, execution).await {
            Ok(Ok(_)) => {
                info!(user_id = %user_id, action, "Registration rolled back");
                true
            }
            Ok(Err(e)) => {
                error!(user_id = %user_id, action, error = %e, "Compensating action failed");
                false
            }
            Err(_) => {
                error!(user_id = %user_id, action, "Compensating action timed out");
                false
            }
        }
    }
}

/// Interpret a `set-policy` output as a success flag.
///
/// An explicit flag under one of [`POLICY_FLAG_KEYS`] decides the verdict and
/// anything that is not clearly true or false counts as failure. Without a
/// flag, any non-empty output is success.
pub fn policy_verdict(output: &ActionOutput) -> Result<(), PolicyFailure> {
    for key in POLICY_FLAG_KEYS {
        if let Some(value) = output.get(key) {
            return match parse_flag(value) {
                Some(true) => Ok(()),
                Some(false) => Err(PolicyFailure::Rejected(format!("{}={}", key, value))),
                None => Err(PolicyFailure::Ambiguous(format!("{}={}", key, value))),
            };
        }
    }

    if output.is_empty() {
        Err(PolicyFailure::EmptyOutput)
    } else {
        Ok(())
    }
}

fn parse_flag(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "ok" | "success" => Some(true),
            "false" | "no" | "0" | "failed" | "failure" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn output(value: serde_json::Value) -> ActionOutput {
        value.as_object().cloned().unwrap_or_default()
    }

    #[rstest]
    #[case(json!({"success": true}))]
    #[case(json!({"success": "True"}))]
    #[case(json!({"policy-set": "yes"}))]
    #[case(json!({"result": 1}))]
    #[case(json!({"message": "policy applied"}))]
    fn test_policy_verdict_success(#[case] out: serde_json::Value) {
        assert!(policy_verdict(&output(out)).is_ok());
    }

    #[rstest]
    #[case(json!({"success": false}))]
    #[case(json!({"success": "false"}))]
    #[case(json!({"policy-set": 0}))]
    #[case(json!({"result": "failed"}))]
    fn test_policy_verdict_rejected(#[case] out: serde_json::Value) {
        assert!(matches!(
            policy_verdict(&output(out)),
            Err(PolicyFailure::Rejected(_))
        ));
    }

    #[rstest]
    #[case(json!({"success": "maybe"}))]
    #[case(json!({"success": null}))]
    #[case(json!({"result": {"nested": true}}))]
    fn test_policy_verdict_ambiguous(#[case] out: serde_json::Value) {
        assert!(matches!(
            policy_verdict(&output(out)),
            Err(PolicyFailure::Ambiguous(_))
        ));
    }

    #[test]
    fn test_policy_verdict_empty_output() {
        assert!(matches!(
            policy_verdict(&ActionOutput::new()),
            Err(PolicyFailure::EmptyOutput)
        ));
    }

    #[test]
    fn test_flag_priority() {
        // "success" wins over "result".
        let out = output(json!({"success": "false", "result": "true"}));
        assert!(policy_verdict(&out).is_err());
    }

    #[test]
    fn test_phase_transitions() {
        use ProvisionPhase::*;

        assert!(Start.can_advance_to(Registering));
        assert!(Registering.can_advance_to(Registered));
        assert!(Registered.can_advance_to(SettingPolicy));
        assert!(SettingPolicy.can_advance_to(PolicyFailed));

        assert!(!Start.can_advance_to(SettingPolicy));
        assert!(!RegisterFailed.can_advance_to(SettingPolicy));
        assert!(!PolicyFailed.can_advance_to(Registering));
        assert!(!Registered.can_advance_to(Cancelled));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(ProvisionPhase::RegisterFailed.is_terminal());
        assert!(ProvisionPhase::PolicySucceeded.is_terminal());
        assert!(ProvisionPhase::PolicyFailed.is_terminal());
        assert!(ProvisionPhase::Cancelled.is_terminal());
        assert!(!ProvisionPhase::Registered.is_terminal());
    }

    #[tokio::test]
    async fn test_cancellation_signal() {
        let (tx, mut cancel) = Cancellation::channel();
        assert!(!cancel.is_cancelled());

        tx.send(true).unwrap();
        assert!(cancel.is_cancelled());
        cancel.cancelled().await;
    }

    #[test]
    fn test_never_cancels() {
        assert!(!Cancellation::never().is_cancelled());
    }
}
