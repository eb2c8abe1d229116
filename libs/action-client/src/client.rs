//! The remote action client contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ActionError;
use crate::locator::ApplicationLocator;

/// Parameters passed to a remote action.
pub type ActionParams = serde_json::Map<String, serde_json::Value>;

/// Output map produced by a completed remote action.
pub type ActionOutput = serde_json::Map<String, serde_json::Value>;

/// Executes named actions on remotely managed applications.
///
/// Implementations must be safe for concurrent, independent calls. Dropping
/// the returned future abandons the call.
#[async_trait]
pub trait RemoteActionClient: Send + Sync {
    /// Run `action` on the application addressed by `locator` and wait at most
    /// `timeout` for it to finish.
    async fn execute_action(
        &self,
        locator: &ApplicationLocator,
        action: &str,
        params: ActionParams,
        timeout: Duration,
    ) -> Result<ActionOutput, ActionError>;
}
