use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Status of a single pipeline run as reported by Kubeflow Pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Skipped,
    Failed,
    Error,
}

impl RunStatus {
    /// Parses an API status string.
    ///
    /// Freshly created runs carry no status yet, and Argo reports a few
    /// intermediate phases the harness does not distinguish; both are pending.
    pub fn parse(value: &str) -> Self {
        match value {
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Skipped" => Self::Skipped,
            "Failed" => Self::Failed,
            "Error" => Self::Error,
            "Pending" | "" => Self::Pending,
            other => {
                debug!("Treating unknown run status {other:?} as pending");
                Self::Pending
            }
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A run submitted under a pipeline's experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub status: RunStatus,
}

impl RunRecord {
    pub fn new(id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }
}

/// Exit status of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Rendered command line, for error reporting
    pub command: String,
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Converts a nonzero exit into [`HarnessError::CommandFailed`].
    pub fn check(self) -> Result<()> {
        if self.success() {
            Ok(())
        } else {
            Err(HarnessError::CommandFailed {
                command: self.command,
                status: self.code.unwrap_or(-1),
            })
        }
    }
}
