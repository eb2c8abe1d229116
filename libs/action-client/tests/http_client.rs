//! Integration tests for the HTTP action client.
//!
//! A wiremock server stands in for the orchestrator's action endpoint.

use std::time::Duration;

use nsc_action_client::{
    ActionError, ActionParams, ApplicationLocator, HttpActionClient, HttpActionClientConfig,
    RemoteActionClient,
};
use serde_json::json;
use wiremock::matchers::{basic_auth, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ADD_USER_PATH: &str = "/v1/models/ns-model/applications/nsb-b-uservdu-aa/actions/add-user";

fn client_for(server: &MockServer) -> HttpActionClient {
    HttpActionClient::new(HttpActionClientConfig {
        base_url: server.uri(),
        model: "ns-model".to_string(),
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
    })
    .unwrap()
    .with_request_grace(Duration::ZERO)
}

fn user_locator() -> ApplicationLocator {
    ApplicationLocator::new("ns1", "userVdu", 1)
}

fn add_user_params() -> ActionParams {
    let mut params = ActionParams::new();
    params.insert("username".to_string(), json!("alice"));
    params.insert("tariff".to_string(), json!("premium"));
    params
}

#[tokio::test]
async fn test_completed_action_returns_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ADD_USER_PATH))
        .and(basic_auth("admin", "secret"))
        .and(body_partial_json(json!({
            "params": {"username": "alice", "tariff": "premium"},
            "timeout_secs": 500
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "output": {"user-id": "42"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let output = client_for(&server)
        .execute_action(
            &user_locator(),
            "add-user",
            add_user_params(),
            Duration::from_secs(500),
        )
        .await
        .unwrap();

    assert_eq!(output["user-id"], "42");
}

#[tokio::test]
async fn test_failed_action_carries_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ADD_USER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "message": "username already taken"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .execute_action(&user_locator(), "add-user", add_user_params(), Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        ActionError::Failed { application, action, message } => {
            assert_eq!(application, "nsb-b-uservdu-aa");
            assert_eq!(action, "add-user");
            assert_eq!(message, "username already taken");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_orchestrator_timeout_status_is_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ADD_USER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "timeout"})))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .execute_action(&user_locator(), "add-user", add_user_params(), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_gateway_timeout_is_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ADD_USER_PATH))
        .respond_with(ResponseTemplate::new(504))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .execute_action(&user_locator(), "add-user", add_user_params(), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_slow_orchestrator_is_bounded_by_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ADD_USER_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "completed", "output": {}}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .execute_action(
            &user_locator(),
            "add-user",
            add_user_params(),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got {err:?}");
}

#[tokio::test]
async fn test_rejected_request_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ADD_USER_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .execute_action(&user_locator(), "add-user", add_user_params(), Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        ActionError::Transport(message) => assert!(message.contains("bad credentials")),
        other => panic!("expected Transport, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ADD_USER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .execute_action(&user_locator(), "add-user", add_user_params(), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_invalid_locator_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .execute_action(
            &ApplicationLocator::new("ns1", "userVdu", 0),
            "add-user",
            add_user_params(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::Locator(_)));
}
