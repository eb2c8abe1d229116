//! Unit status reporting.
//!
//! The unit's status is what operators see next to the application in the
//! orchestrator. It is one of four workload states plus a free-form reason.

use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// Workload status of this unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum UnitStatus {
    /// Waiting on something outside the unit's control.
    Waiting(String),
    /// Ready to serve.
    Active(String),
    /// Needs operator intervention.
    Blocked(String),
    /// Performing internal work.
    Maintenance(String),
}

impl UnitStatus {
    pub fn waiting(message: impl Into<String>) -> Self {
        UnitStatus::Waiting(message.into())
    }

    pub fn active() -> Self {
        UnitStatus::Active(String::new())
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        UnitStatus::Blocked(message.into())
    }

    pub fn maintenance(message: impl Into<String>) -> Self {
        UnitStatus::Maintenance(message.into())
    }

    /// State name as understood by `status-set`.
    pub fn state(&self) -> &'static str {
        match self {
            UnitStatus::Waiting(_) => "waiting",
            UnitStatus::Active(_) => "active",
            UnitStatus::Blocked(_) => "blocked",
            UnitStatus::Maintenance(_) => "maintenance",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Waiting(m)
            | UnitStatus::Active(m)
            | UnitStatus::Blocked(m)
            | UnitStatus::Maintenance(m) => m,
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message().is_empty() {
            write!(f, "{}", self.state())
        } else {
            write!(f, "{}: {}", self.state(), self.message())
        }
    }
}

/// Sink for unit status changes.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Publish the unit's new status.
    async fn set_status(&self, status: UnitStatus) -> Result<()>;
}

/// Reporter that only logs, for dry runs.
#[derive(Debug, Default)]
pub struct LogStatusReporter;

#[async_trait]
impl StatusReporter for LogStatusReporter {
    async fn set_status(&self, status: UnitStatus) -> Result<()> {
        info!(state = status.state(), message = status.message(), "Unit status changed");
        Ok(())
    }
}

/// Reporter that keeps every status it receives.
#[derive(Debug, Default)]
pub struct RecordingStatusReporter {
    history: Mutex<Vec<UnitStatus>>,
}

impl RecordingStatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status received, oldest first.
    pub fn history(&self) -> Vec<UnitStatus> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent status.
    pub fn current(&self) -> Option<UnitStatus> {
        self.history().last().cloned()
    }
}

#[async_trait]
impl StatusReporter for RecordingStatusReporter {
    async fn set_status(&self, status: UnitStatus) -> Result<()> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(status);
        Ok(())
    }
}
