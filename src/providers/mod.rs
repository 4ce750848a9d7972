//! Narrow interfaces to the external systems the harness drives.
//!
//! The scenario, poller and janitor only talk to these traits, so tests can
//! substitute recording fakes for the real command-line and REST collaborators.

mod command;
mod gcp;
mod kubeflow;
mod tfx;
mod types;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

pub use gcp::{GcrRegistry, GcsStore};
pub use kubeflow::{discover_endpoint, KubeflowClient};
pub use tfx::TfxCli;
pub use types::{CommandOutcome, RunRecord, RunStatus};

/// Pipeline lifecycle commands of the orchestration CLI.
///
/// Success is judged by the exit status alone; implementations never retry.
#[async_trait]
pub trait LifecycleClient: Send + Sync {
    async fn create(
        &self,
        pipeline_path: &str,
        endpoint: &str,
        target_image: &str,
        base_image: &str,
    ) -> Result<CommandOutcome>;

    async fn update(&self, pipeline_path: &str, endpoint: &str) -> Result<CommandOutcome>;

    async fn submit_run(&self, pipeline_name: &str, endpoint: &str) -> Result<CommandOutcome>;

    async fn delete(&self, pipeline_name: &str, endpoint: &str) -> Result<CommandOutcome>;
}

/// Query side of the orchestration service.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Every run recorded under the pipeline's experiment, oldest stages included.
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunRecord>>;

    async fn delete_run(&self, run_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, bucket: &str, path: &str, local_file: &Path) -> Result<()>;

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<()>;
}

#[async_trait]
pub trait ImageRegistry: Send + Sync {
    async fn delete_image(&self, reference: &str) -> Result<()>;
}
