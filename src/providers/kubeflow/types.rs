use serde::Deserialize;

use crate::providers::types::{RunRecord, RunStatus};

/// Experiment as returned by `GET /apis/v1beta1/experiments`.
///
/// The tfx CLI files every run of a pipeline under an experiment named after it.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiExperiment {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Run as returned by `GET /apis/v1beta1/runs`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRun {
    pub id: String,
    /// Absent until the workflow controller picks the run up
    #[serde(default)]
    pub status: Option<String>,
}

impl From<ApiRun> for RunRecord {
    fn from(run: ApiRun) -> Self {
        let status = RunStatus::parse(run.status.as_deref().unwrap_or_default());
        Self { id: run.id, status }
    }
}

// The API omits empty collections entirely, hence the defaults.

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListExperimentsResponse {
    #[serde(default)]
    pub experiments: Vec<ApiExperiment>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListRunsResponse {
    #[serde(default)]
    pub runs: Vec<ApiRun>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}
