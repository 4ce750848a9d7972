use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::providers::RunStatus;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Endpoint discovery failed: {0}")]
    EndpointDiscovery(String),

    #[error("Pattern {pattern:?} not found in {}", file.display())]
    TargetNotFound { file: PathBuf, pattern: String },

    #[error("Command `{command}` exited with status {status}")]
    CommandFailed { command: String, status: i32 },

    #[error("Run {run_id} finished with unexpected status {status}")]
    RunFailed { run_id: String, status: RunStatus },

    #[error("Runs of {pipeline} did not complete after {polls} polls ({waited:?})")]
    PollTimeout {
        pipeline: String,
        polls: u32,
        waited: Duration,
    },

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("API request failed with status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("API request failed with status {status} after {retries} retries")]
    ApiErrorAfterRetries { status: u16, retries: u32 },

    #[error("Telemetry label check failed: {0}")]
    Telemetry(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
