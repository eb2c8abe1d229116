//! Integration tests for hook and action dispatch.
//!
//! Tests verify the unit status sequence each hook produces and the
//! `add-user` action surface.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use nsc_action_client::ScriptedActionClient;
use nsc_agent::config::Password;
use nsc_agent::lifecycle::LifecycleError;
use nsc_agent::status::RecordingStatusReporter;
use nsc_agent::{
    ActionOutcome, Cancellation, CharmConfig, HookEvent, LifecycleController, StatusReporter,
    UnitStatus,
};
use serde_json::json;

const USER_APP: &str = "nsb-b-uservdu-aa";
const POLICY_APP: &str = "nsb-c-policyvdu-ab";

fn test_config() -> CharmConfig {
    CharmConfig {
        nsr_name: Some("ns1".to_string()),
        user_vdu_id: Some("userVdu".to_string()),
        user_member_index: Some(1),
        policy_vdu_id: Some("policyVdu".to_string()),
        policy_member_index: Some(2),
        juju_username: Some("admin".to_string()),
        juju_password: Some(Password::new("secret")),
        ..CharmConfig::default()
    }
}

fn controller(
    config: CharmConfig,
    client: ScriptedActionClient,
) -> (LifecycleController, Arc<RecordingStatusReporter>, Arc<ScriptedActionClient>) {
    let status = Arc::new(RecordingStatusReporter::new());
    let client = Arc::new(client);
    let controller = LifecycleController::new(Arc::new(config), status.clone(), client.clone());
    (controller, status, client)
}

fn alice_params() -> serde_json::Value {
    json!({"username": "alice", "bw": 100, "qos": "gold", "tariff": "premium"})
}

struct FailingReporter;

#[async_trait]
impl StatusReporter for FailingReporter {
    async fn set_status(&self, _status: UnitStatus) -> Result<()> {
        anyhow::bail!("status-set not available")
    }
}

#[tokio::test]
async fn test_install_leaves_status_untouched() {
    let (controller, status, _) = controller(test_config(), ScriptedActionClient::new());

    controller.handle_hook(HookEvent::Install).await.unwrap();

    assert!(status.history().is_empty());
}

#[tokio::test]
async fn test_upgrade_goes_through_maintenance() {
    let (controller, status, _) = controller(test_config(), ScriptedActionClient::new());

    controller.handle_hook(HookEvent::UpgradeCharm).await.unwrap();

    assert_eq!(
        status.history(),
        vec![UnitStatus::maintenance("Upgrading charm"), UnitStatus::active()]
    );
}

#[tokio::test]
async fn test_config_changed_with_credentials_is_active() {
    let (controller, status, _) = controller(test_config(), ScriptedActionClient::new());

    controller.handle_hook(HookEvent::ConfigChanged).await.unwrap();

    assert_eq!(
        status.history(),
        vec![
            UnitStatus::waiting("Waiting for Juju credentials"),
            UnitStatus::active()
        ]
    );
}

#[tokio::test]
async fn test_config_changed_without_credentials_is_blocked() {
    let config = CharmConfig {
        juju_password: None,
        ..test_config()
    };
    let (controller, status, _) = controller(config, ScriptedActionClient::new());

    controller.handle_hook(HookEvent::ConfigChanged).await.unwrap();

    assert_eq!(
        status.current(),
        Some(UnitStatus::blocked("Invalid Juju credentials."))
    );
}

#[tokio::test]
async fn test_config_changed_without_locators_is_blocked() {
    let config = CharmConfig {
        nsr_name: None,
        user_member_index: None,
        ..test_config()
    };
    let (controller, status, _) = controller(config, ScriptedActionClient::new());

    controller.handle_hook(HookEvent::ConfigChanged).await.unwrap();

    assert_eq!(
        status.current(),
        Some(UnitStatus::blocked(
            "Missing configuration: nsr-name, user-member-index"
        ))
    );
}

#[tokio::test]
async fn test_config_changed_with_unencodable_member_index_is_blocked() {
    let config = CharmConfig {
        user_member_index: Some(700),
        ..test_config()
    };
    let (controller, status, _) = controller(config, ScriptedActionClient::new());

    controller.handle_hook(HookEvent::ConfigChanged).await.unwrap();

    assert_eq!(
        status.current(),
        Some(UnitStatus::blocked("Missing configuration: user-member-index"))
    );
}

#[tokio::test]
async fn test_status_failure_is_an_error() {
    let controller = LifecycleController::new(
        Arc::new(test_config()),
        Arc::new(FailingReporter),
        Arc::new(ScriptedActionClient::new()),
    );

    let err = controller
        .handle_hook(HookEvent::ConfigChanged)
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Status(_)));
}

#[tokio::test]
async fn test_add_user_action_publishes_result() {
    let client = ScriptedActionClient::new()
        .respond(USER_APP, "add-user", json!({"user-id": "42"}))
        .respond(POLICY_APP, "set-policy", json!({"success": true}));
    let (controller, status, _) = controller(test_config(), client);

    let outcome = controller
        .run_action("add-user", &alice_params(), Cancellation::never())
        .await
        .unwrap();

    let expected = json!({"user-id": 42, "policy-set": true});
    assert_eq!(
        outcome,
        ActionOutcome::Completed(expected.as_object().unwrap().clone())
    );
    // Actions do not change unit status.
    assert!(status.history().is_empty());
}

#[tokio::test]
async fn test_add_user_action_reports_registration_failure() {
    let client = ScriptedActionClient::new()
        .respond(USER_APP, "add-user", json!({"user-id": "0"}))
        .respond(POLICY_APP, "set-policy", json!({"success": true}));
    let (controller, _, client) = controller(test_config(), client);

    let outcome = controller
        .run_action("add-user", &alice_params(), Cancellation::never())
        .await
        .unwrap();

    match outcome {
        ActionOutcome::Failed(message) => {
            assert!(message.starts_with("user_id is 0; add_user failed"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(client.calls_to(POLICY_APP).is_empty());
}

#[tokio::test]
async fn test_add_user_action_rejects_bad_params() {
    let (controller, _, client) = controller(test_config(), ScriptedActionClient::new());

    let outcome = controller
        .run_action(
            "add-user",
            &json!({"username": "alice", "bw": "lots"}),
            Cancellation::never(),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, ActionOutcome::Failed(m) if m.starts_with("invalid request")));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_add_user_action_reports_missing_configuration() {
    let config = CharmConfig {
        policy_vdu_id: None,
        ..test_config()
    };
    let (controller, _, client) = controller(config, ScriptedActionClient::new());

    let outcome = controller
        .run_action("add-user", &alice_params(), Cancellation::never())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ActionOutcome::Failed("configuration missing: policy-vdu-id".to_string())
    );
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_action_is_an_error() {
    let (controller, _, _) = controller(test_config(), ScriptedActionClient::new());

    let err = controller
        .run_action("remove-user", &json!({}), Cancellation::never())
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::UnknownAction(name) if name == "remove-user"));
}
