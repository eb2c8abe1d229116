//! Bridge to the orchestrator's hook tools.
//!
//! While a hook or action runs, the orchestrator puts a set of helper
//! executables on `PATH` (`status-set`, `action-get`, `action-set`,
//! `action-fail`). The agent talks back to the orchestrator exclusively
//! through them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::status::{StatusReporter, UnitStatus};

/// Invokes hook tools as subprocesses.
#[derive(Debug, Clone, Default)]
pub struct HookTools {
    /// Directory holding the tools; `PATH` lookup when unset.
    bin_dir: Option<PathBuf>,
}

impl HookTools {
    /// Resolve tools through `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve tools from `dir`.
    pub fn with_bin_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: Some(dir.into()),
        }
    }

    fn command(&self, tool: &str) -> Command {
        match &self.bin_dir {
            Some(dir) => Command::new(dir.join(tool)),
            None => Command::new(tool),
        }
    }

    /// Run `tool` with `args` and return its stdout.
    async fn run(&self, tool: &str, args: &[String]) -> Result<String> {
        debug!(tool, args = ?args, "Running hook tool");

        let output = self
            .command(tool)
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to execute {}", tool))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} failed: {}", tool, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Fetch the parameters of the running action.
    pub async fn action_get(&self) -> Result<serde_json::Value> {
        let stdout = self.run("action-get", &["--format=json".to_string()]).await?;
        serde_json::from_str(stdout.trim()).context("action-get returned invalid JSON")
    }

    /// Publish the results of the running action.
    pub async fn action_set(
        &self,
        results: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        let args: Vec<String> = results
            .iter()
            .map(|(key, value)| format!("{}={}", key, render_value(value)))
            .collect();
        self.run("action-set", &args).await?;
        Ok(())
    }

    /// Mark the running action as failed.
    pub async fn action_fail(&self, message: &str) -> Result<()> {
        self.run("action-fail", &[message.to_string()]).await?;
        Ok(())
    }
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl StatusReporter for HookTools {
    async fn set_status(&self, status: UnitStatus) -> Result<()> {
        self.run(
            "status-set",
            &[status.state().to_string(), status.message().to_string()],
        )
        .await?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use serde_json::json;

    use super::*;

    /// Install a fake tool that appends its arguments to `calls.log`.
    fn install_recorder(dir: &Path, tool: &str) {
        let script = format!(
            "#!/bin/sh\necho \"{} $*\" >> \"{}/calls.log\"\n",
            tool,
            dir.display()
        );
        install_script(dir, tool, &script);
    }

    fn install_script(dir: &Path, tool: &str, script: &str) {
        let path = dir.join(tool);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_hook_tools_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        install_recorder(dir.path(), "status-set");
        install_recorder(dir.path(), "action-set");
        install_recorder(dir.path(), "action-fail");
        install_script(
            dir.path(),
            "action-get",
            "#!/bin/sh\necho '{\"username\": \"alice\", \"bw\": 100, \"qos\": \"gold\", \"tariff\": \"premium\"}'\n",
        );

        let tools = HookTools::with_bin_dir(dir.path());

        let params = tools.action_get().await.unwrap();
        assert_eq!(params["username"], "alice");
        assert_eq!(params["bw"], 100);

        tools
            .set_status(UnitStatus::blocked("Invalid Juju credentials."))
            .await
            .unwrap();
        let mut results = serde_json::Map::new();
        results.insert("user-id".to_string(), json!(42));
        results.insert("policy-set".to_string(), json!(true));
        tools.action_set(&results).await.unwrap();
        tools.action_fail("user_id is 0; add_user failed").await.unwrap();

        assert_eq!(
            calls(dir.path()),
            vec![
                "status-set blocked Invalid Juju credentials.",
                "action-set policy-set=true user-id=42",
                "action-fail user_id is 0; add_user failed",
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_tool_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        install_script(dir.path(), "status-set", "#!/bin/sh\necho 'not in a hook' >&2\nexit 1\n");

        let tools = HookTools::with_bin_dir(dir.path());
        let err = tools.set_status(UnitStatus::active()).await.unwrap_err();
        assert!(err.to_string().contains("not in a hook"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tools = HookTools::with_bin_dir(dir.path());
        assert!(tools.action_get().await.is_err());
    }
}
