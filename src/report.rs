use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a single harness invocation did, emitted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub pipeline_name: String,
    pub target_image: String,
    pub endpoint: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    /// First fatal condition, if any
    pub failure: Option<String>,
    pub stages: Vec<StageReport>,
    /// `None` when cleanup was skipped on request
    pub cleanup: Option<CleanupReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub submit: SubmitKind,
    pub status: StageStatus,
    /// Runs seen under the pipeline when the stage finished polling
    pub runs_observed: usize,
    pub polls: u32,
    pub duration_secs: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitKind {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    NotRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupStep {
    DeleteImage,
    DeletePipeline,
    DeleteArtifacts,
    DeleteRuns,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DeleteImage => "delete container image",
            Self::DeletePipeline => "delete pipeline",
            Self::DeleteArtifacts => "delete pipeline artifacts",
            Self::DeleteRuns => "delete runs",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupStepReport {
    pub step: CleanupStep,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub steps: Vec<CleanupStepReport>,
}

impl CleanupReport {
    pub fn failed_steps(&self) -> impl Iterator<Item = &CleanupStepReport> {
        self.steps.iter().filter(|step| step.error.is_some())
    }
}
