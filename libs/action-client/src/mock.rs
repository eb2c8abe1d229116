//! Scripted in-memory action client.
//!
//! Responses are registered per `(application, action)` pair. Every call is
//! recorded, including calls that never return, so tests can assert exactly
//! which applications were contacted.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::client::{ActionOutput, ActionParams, RemoteActionClient};
use crate::error::ActionError;
use crate::locator::ApplicationLocator;

type Handler = Box<dyn Fn(&ActionParams) -> Result<ActionOutput, ActionError> + Send + Sync>;

/// Build an [`ActionOutput`] from a JSON object literal.
///
/// Anything other than an object yields an empty output.
pub fn output(value: serde_json::Value) -> ActionOutput {
    match value {
        serde_json::Value::Object(map) => map,
        _ => ActionOutput::new(),
    }
}

/// A call observed by [`ScriptedActionClient`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub application: String,
    pub action: String,
    pub params: ActionParams,
    pub timeout: Duration,
}

enum Behavior {
    /// Answer immediately.
    Respond(Handler),
    /// Answer after a delay; a delay beyond the timeout yields a timeout.
    Delayed(Duration, Handler),
    /// Never answer.
    Hang,
}

/// Action client with scripted responses.
pub struct ScriptedActionClient {
    scripts: HashMap<(String, String), Behavior>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedActionClient {
    /// Create a client with no scripted responses.
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer `action` on `application` with the result of `handler`.
    pub fn respond_with<F>(mut self, application: &str, action: &str, handler: F) -> Self
    where
        F: Fn(&ActionParams) -> Result<ActionOutput, ActionError> + Send + Sync + 'static,
    {
        self.scripts.insert(
            (application.to_string(), action.to_string()),
            Behavior::Respond(Box::new(handler)),
        );
        self
    }

    /// Answer `action` on `application` with a fixed output.
    pub fn respond(self, application: &str, action: &str, value: serde_json::Value) -> Self {
        let out = output(value);
        self.respond_with(application, action, move |_| Ok(out.clone()))
    }

    /// Fail `action` on `application` with `error`.
    pub fn fail(self, application: &str, action: &str, error: ActionError) -> Self {
        self.respond_with(application, action, move |_| Err(error.clone()))
    }

    /// Answer `action` on `application` with a fixed output after `delay`.
    ///
    /// Delays longer than the call's timeout end in [`ActionError::Timeout`]
    /// once the timeout elapses, like a client that honours its bound.
    pub fn respond_after(
        mut self,
        application: &str,
        action: &str,
        delay: Duration,
        value: serde_json::Value,
    ) -> Self {
        let out = output(value);
        self.scripts.insert(
            (application.to_string(), action.to_string()),
            Behavior::Delayed(delay, Box::new(move |_| Ok(out.clone()))),
        );
        self
    }

    /// Never answer `action` on `application`.
    pub fn hang(mut self, application: &str, action: &str) -> Self {
        self.scripts
            .insert((application.to_string(), action.to_string()), Behavior::Hang);
        self
    }

    /// All calls observed so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls made to `application`, in order.
    pub fn calls_to(&self, application: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.application == application)
            .collect()
    }

    /// Number of times `action` was invoked on `application`.
    pub fn call_count(&self, application: &str, action: &str) -> usize {
        self.calls_to(application)
            .iter()
            .filter(|c| c.action == action)
            .count()
    }

    fn record(&self, call: RecordedCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl Default for ScriptedActionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteActionClient for ScriptedActionClient {
    async fn execute_action(
        &self,
        locator: &ApplicationLocator,
        action: &str,
        params: ActionParams,
        timeout: Duration,
    ) -> Result<ActionOutput, ActionError> {
        let application = locator.application_name()?;
        debug!(application = %application, action, "[MOCK] Executing action");

        self.record(RecordedCall {
            application: application.clone(),
            action: action.to_string(),
            params: params.clone(),
            timeout,
        });

        let key = (application.clone(), action.to_string());
        match self.scripts.get(&key) {
            Some(Behavior::Respond(handler)) => handler(&params),
            Some(Behavior::Delayed(delay, handler)) => {
                if *delay > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(ActionError::Timeout {
                        application,
                        action: action.to_string(),
                        timeout,
                    });
                }
                tokio::time::sleep(*delay).await;
                handler(&params)
            }
            Some(Behavior::Hang) => std::future::pending::<Result<ActionOutput, ActionError>>().await,
            None => Err(ActionError::Failed {
                application,
                action: action.to_string(),
                message: "no scripted response".to_string(),
            }),
        }
    }
}
