use log::{info, warn};

use crate::config::HarnessConfig;
use crate::error::Result;
use crate::identity::PipelineIdentity;
use crate::providers::{ImageRegistry, LifecycleClient, ObjectStore, RunStore};
use crate::report::{CleanupReport, CleanupStep, CleanupStepReport};

/// Removes every remote resource a scenario may have created.
///
/// Each step runs regardless of how the previous ones went, and failures only
/// end up in the log and the returned report. A resource that was never
/// created (say, the image of a run that failed before pushing it) just makes
/// its step fail quietly.
pub struct Janitor<'a> {
    config: &'a HarnessConfig,
    endpoint: &'a str,
    lifecycle: &'a dyn LifecycleClient,
    runs: &'a dyn RunStore,
    storage: &'a dyn ObjectStore,
    registry: &'a dyn ImageRegistry,
}

impl<'a> Janitor<'a> {
    pub fn new(
        config: &'a HarnessConfig,
        endpoint: &'a str,
        lifecycle: &'a dyn LifecycleClient,
        runs: &'a dyn RunStore,
        storage: &'a dyn ObjectStore,
        registry: &'a dyn ImageRegistry,
    ) -> Self {
        Self {
            config,
            endpoint,
            lifecycle,
            runs,
            storage,
            registry,
        }
    }

    pub async fn cleanup(&self, identity: &PipelineIdentity) -> CleanupReport {
        info!("Cleaning up resources of {}", identity.name);

        let mut report = CleanupReport::default();
        record(&mut report, CleanupStep::DeleteImage, self.delete_image(identity).await);
        record(&mut report, CleanupStep::DeletePipeline, self.delete_pipeline(identity).await);
        record(&mut report, CleanupStep::DeleteArtifacts, self.delete_artifacts(identity).await);
        record(&mut report, CleanupStep::DeleteRuns, self.delete_runs(identity).await);
        report
    }

    async fn delete_image(&self, identity: &PipelineIdentity) -> Result<()> {
        self.registry.delete_image(&identity.target_image).await
    }

    async fn delete_pipeline(&self, identity: &PipelineIdentity) -> Result<()> {
        self.lifecycle
            .delete(&identity.name, self.endpoint)
            .await?
            .check()
    }

    /// Both the pipeline outputs and the staged input data are removed, even
    /// if the first deletion fails.
    async fn delete_artifacts(&self, identity: &PipelineIdentity) -> Result<()> {
        let prefixes = [
            self.config.output_prefix(&identity.name),
            self.config.data_prefix(&identity.name),
        ];

        let mut first_error = None;
        for prefix in &prefixes {
            if let Err(e) = self.storage.delete_prefix(&self.config.bucket, prefix).await {
                warn!("Failed to delete gs://{}/{prefix}: {e}", self.config.bucket);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn delete_runs(&self, identity: &PipelineIdentity) -> Result<()> {
        let runs = self.runs.list_runs(&identity.name).await?;

        let mut first_error = None;
        for run in &runs {
            if let Err(e) = self.runs.delete_run(&run.id).await {
                warn!("Failed to delete run {}: {e}", run.id);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

fn record(report: &mut CleanupReport, step: CleanupStep, result: Result<()>) {
    let error = match result {
        Ok(()) => {
            info!("Cleanup: {step} done");
            None
        }
        Err(e) => {
            warn!("Cleanup: {step} failed: {e}");
            Some(e.to_string())
        }
    };
    report.steps.push(CleanupStepReport { step, error });
}
