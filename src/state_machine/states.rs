use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by job executions and step executions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Execution record created, work not yet begun
    #[default]
    Starting,
    /// Work is in progress
    Started,
    /// A stop was requested and is waiting for a safe boundary
    Stopping,
    /// Work stopped cooperatively; restartable
    Stopped,
    /// Work failed; restartable
    Failed,
    /// Work finished successfully
    Completed,
    /// Operator gave up on the execution; never restartable
    Abandoned,
}

impl BatchStatus {
    /// Check if this is a terminal state (no further work will happen)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Stopped | Self::Failed | Self::Completed | Self::Abandoned
        )
    }

    /// Check if work may still be happening for this execution
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Starting | Self::Started | Self::Stopping)
    }

    /// Check if an execution in this state can be restarted
    pub fn is_restartable(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Canonical upper-case name, also the default exit status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
            Self::Completed => "COMPLETED",
            Self::Abandoned => "ABANDONED",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTING" => Ok(Self::Starting),
            "STARTED" => Ok(Self::Started),
            "STOPPING" => Ok(Self::Stopping),
            "STOPPED" => Ok(Self::Stopped),
            "FAILED" => Ok(Self::Failed),
            "COMPLETED" => Ok(Self::Completed),
            "ABANDONED" => Ok(Self::Abandoned),
            _ => Err(format!("Invalid batch status: {s}")),
        }
    }
}
