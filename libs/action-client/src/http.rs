//! HTTP implementation of the remote action client.
//!
//! Actions are submitted to the orchestrator's action endpoint and the
//! request blocks until the action finishes or its timeout elapses:
//!
//! ```text
//! POST {base_url}/v1/models/{model}/applications/{application}/actions/{action}
//! {"params": {...}, "timeout_secs": 500}
//! ```
//!
//! The orchestrator answers `200` with
//! `{"status": "completed" | "failed" | "timeout", "output": {...}, "message": "..."}`
//! or `504` when its own wait expired.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::client::{ActionOutput, ActionParams, RemoteActionClient};
use crate::error::ActionError;
use crate::locator::ApplicationLocator;

/// Extra time granted to the HTTP request on top of the action timeout, so
/// the orchestrator's own timeout verdict arrives before ours.
const DEFAULT_REQUEST_GRACE: Duration = Duration::from_secs(5);

/// Connection settings for [`HttpActionClient`].
#[derive(Debug, Clone)]
pub struct HttpActionClientConfig {
    /// Orchestrator API base URL.
    pub base_url: String,

    /// Model the network service is deployed in.
    pub model: String,

    /// Orchestrator username.
    pub username: Option<String>,

    /// Orchestrator password.
    pub password: Option<String>,
}

/// Remote action client backed by the orchestrator's HTTP API.
pub struct HttpActionClient {
    client: reqwest::Client,
    base_url: Url,
    model: String,
    credentials: Option<(String, String)>,
    request_grace: Duration,
}

impl HttpActionClient {
    /// Create a new HTTP action client.
    pub fn new(config: HttpActionClientConfig) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ActionError::Transport(format!("failed to build HTTP client: {e}")))?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ActionError::Transport(format!("invalid orchestrator URL {}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ActionError::Transport(format!(
                "invalid orchestrator URL {}: not a base URL",
                config.base_url
            )));
        }

        let credentials = match (config.username, config.password) {
            (Some(user), Some(secret)) => Some((user, secret)),
            _ => None,
        };

        Ok(Self {
            client,
            base_url,
            model: config.model,
            credentials,
            request_grace: DEFAULT_REQUEST_GRACE,
        })
    }

    /// Override the extra time granted to requests beyond the action timeout.
    pub fn with_request_grace(mut self, grace: Duration) -> Self {
        self.request_grace = grace;
        self
    }

    /// Build the action endpoint, escaping each path segment.
    fn action_url(&self, application: &str, action: &str) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "v1",
                "models",
                &self.model,
                "applications",
                application,
                "actions",
                action,
            ]);
        }
        url
    }
}

#[derive(Debug, Serialize)]
struct ExecuteActionRequest<'a> {
    params: &'a ActionParams,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ExecuteActionResponse {
    status: RemoteActionStatus,
    #[serde(default)]
    output: ActionOutput,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RemoteActionStatus {
    Completed,
    Failed,
    Timeout,
}

#[async_trait]
impl RemoteActionClient for HttpActionClient {
    async fn execute_action(
        &self,
        locator: &ApplicationLocator,
        action: &str,
        params: ActionParams,
        timeout: Duration,
    ) -> Result<ActionOutput, ActionError> {
        let application = locator.application_name()?;
        let url = self.action_url(&application, action);
        debug!(url = %url, action, timeout_secs = timeout.as_secs(), "Executing remote action");

        let timed_out = || ActionError::Timeout {
            application: application.clone(),
            action: action.to_string(),
            timeout,
        };

        let body = ExecuteActionRequest {
            params: &params,
            timeout_secs: timeout.as_secs().max(1),
        };
        let mut request = self
            .client
            .post(url)
            .json(&body)
            .timeout(timeout + self.request_grace);
        if let Some((user, secret)) = &self.credentials {
            request = request.basic_auth(user, Some(secret));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(application = %application, action, "Remote action request timed out");
                return Err(timed_out());
            }
            Err(e) => return Err(ActionError::Transport(e.to_string())),
        };

        let status = response.status();
        if status == StatusCode::GATEWAY_TIMEOUT {
            return Err(timed_out());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, action, "Remote action request rejected");
            return Err(ActionError::Transport(format!("{} - {}", status, text)));
        }

        let result: ExecuteActionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                timed_out()
            } else {
                ActionError::InvalidResponse(e.to_string())
            }
        })?;

        match result.status {
            RemoteActionStatus::Completed => {
                debug!(application = %application, action, keys = result.output.len(), "Remote action completed");
                Ok(result.output)
            }
            RemoteActionStatus::Failed => Err(ActionError::Failed {
                application,
                action: action.to_string(),
                message: result
                    .message
                    .unwrap_or_else(|| "action reported failure".to_string()),
            }),
            RemoteActionStatus::Timeout => Err(timed_out()),
        }
    }
}
