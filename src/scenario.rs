use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{error, info, warn};

use crate::config::HarnessConfig;
use crate::error::Result;
use crate::identity::PipelineIdentity;
use crate::janitor::Janitor;
use crate::poller::RunPoller;
use crate::providers::{LifecycleClient, ObjectStore, RunStore};
use crate::report::{CleanupReport, StageReport, StageStatus, SubmitKind};
use crate::telemetry;
use crate::transform::TextTransform;

const CONFIGS_FILE: &str = "pipeline/configs.py";
const PIPELINE_FILE: &str = "pipeline/pipeline.py";

/// Name of the staged data object under the per-pipeline data prefix.
const DATA_OBJECT: &str = "data.csv";

/// Checks run after a stage's runs succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assertion {
    /// The packaged pipeline definition carries the template telemetry label.
    TelemetryLabel,
}

/// One scripted increment of the scenario: mutate, submit, await, assert.
#[derive(Debug, Clone)]
pub struct ScenarioStage {
    pub name: &'static str,
    pub transforms: Vec<TextTransform>,
    pub submit: SubmitKind,
    pub assertions: Vec<Assertion>,
}

/// The four fixed stages of the template customization walk-through.
pub fn lifecycle_stages(config: &HarnessConfig, identity: &PipelineIdentity) -> Vec<ScenarioStage> {
    let runner = PathBuf::from(&config.settings.tfx.pipeline_path);
    let pair = |old: &str, new: String| (old.to_string(), new);

    vec![
        ScenarioStage {
            name: "baseline",
            transforms: vec![
                TextTransform::assign(CONFIGS_FILE, "PIPELINE_NAME", &identity.name),
                TextTransform::uncomment_variables(
                    CONFIGS_FILE,
                    &[
                        "GOOGLE_CLOUD_REGION",
                        "BIG_QUERY_WITH_DIRECT_RUNNER_BEAM_PIPELINE_ARGS",
                        "BIG_QUERY_QUERY",
                        "DATAFLOW_BEAM_PIPELINE_ARGS",
                        "GCP_AI_PLATFORM_TRAINING_ARGS",
                        "GCP_AI_PLATFORM_SERVING_ARGS",
                    ],
                ),
                TextTransform::replace(
                    runner.clone(),
                    vec![pair(
                        "DATA_PATH = 'gs://{}/tfx-template/data/'.format(configs.GCS_BUCKET_NAME)",
                        format!(
                            "DATA_PATH = 'gs://{{}}/{}'.format(configs.GCS_BUCKET_NAME)",
                            config.data_prefix(&identity.name)
                        ),
                    )],
                ),
            ],
            submit: SubmitKind::Create,
            assertions: vec![Assertion::TelemetryLabel],
        },
        ScenarioStage {
            name: "full-components",
            transforms: vec![TextTransform::uncomment_all(
                PIPELINE_FILE,
                &["components.append("],
            )],
            submit: SubmitKind::Update,
            assertions: vec![],
        },
        ScenarioStage {
            name: "query-data-source",
            transforms: vec![
                TextTransform::uncomment(
                    PIPELINE_FILE,
                    &["query: Text,", "example_gen = BigQueryExampleGen("],
                ),
                TextTransform::uncomment(
                    runner.clone(),
                    &[
                        "query=configs.BIG_QUERY_QUERY",
                        "beam_pipeline_args=configs\n",
                        ".BIG_QUERY_WITH_DIRECT_RUNNER_BEAM_PIPELINE_ARGS,",
                    ],
                ),
            ],
            submit: SubmitKind::Update,
            assertions: vec![],
        },
        ScenarioStage {
            name: "distributed-backend",
            transforms: vec![
                TextTransform::replace(
                    CONFIGS_FILE,
                    vec![
                        pair(
                            "GOOGLE_CLOUD_REGION = ''",
                            format!("GOOGLE_CLOUD_REGION = '{}'", config.region),
                        ),
                        pair(
                            "'imageUri': 'gcr.io/' + GOOGLE_CLOUD_PROJECT + '/tfx-pipeline'",
                            format!("'imageUri': '{}'", identity.target_image),
                        ),
                    ],
                ),
                TextTransform::replace(
                    runner.clone(),
                    vec![
                        pair(
                            "beam_pipeline_args=configs\n",
                            "# beam_pipeline_args=configs\n".to_string(),
                        ),
                        pair(
                            ".BIG_QUERY_WITH_DIRECT_RUNNER_BEAM_PIPELINE_ARGS,",
                            "# .BIG_QUERY_WITH_DIRECT_RUNNER_BEAM_PIPELINE_ARGS,".to_string(),
                        ),
                    ],
                ),
                TextTransform::uncomment(
                    runner,
                    &[
                        "beam_pipeline_args=configs.DATAFLOW_BEAM_PIPELINE_ARGS,",
                        "ai_platform_training_args=configs.GCP_AI_PLATFORM_TRAINING_ARGS,",
                        "ai_platform_serving_args=configs.GCP_AI_PLATFORM_SERVING_ARGS,",
                    ],
                ),
            ],
            submit: SubmitKind::Update,
            assertions: vec![],
        },
    ]
}

/// Per-stage reports plus the first fatal error, if any.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub stages: Vec<StageReport>,
    pub result: Result<()>,
}

#[derive(Debug, Default)]
struct StageProgress {
    polls: u32,
    runs_observed: usize,
}

/// Drives the stages strictly in order against one working copy.
pub struct Scenario<'a> {
    config: &'a HarnessConfig,
    identity: &'a PipelineIdentity,
    endpoint: &'a str,
    template_dir: &'a Path,
    lifecycle: &'a dyn LifecycleClient,
    runs: &'a dyn RunStore,
    storage: &'a dyn ObjectStore,
    poller: RunPoller,
}

impl<'a> Scenario<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &'a HarnessConfig,
        identity: &'a PipelineIdentity,
        endpoint: &'a str,
        template_dir: &'a Path,
        lifecycle: &'a dyn LifecycleClient,
        runs: &'a dyn RunStore,
        storage: &'a dyn ObjectStore,
        poller: RunPoller,
    ) -> Self {
        Self {
            config,
            identity,
            endpoint,
            template_dir,
            lifecycle,
            runs,
            storage,
            poller,
        }
    }

    /// Stages the input data, then runs every stage until one fails.
    ///
    /// Stages after a failure are reported as not run. The result never covers
    /// cleanup, which the caller performs separately.
    pub async fn run(&self) -> ScenarioOutcome {
        let stages = lifecycle_stages(self.config, self.identity);
        let mut reports: Vec<StageReport> = stages.iter().map(not_run).collect();

        if let Err(e) = self.prepare_data().await {
            error!("Failed to stage input data: {e}");
            return ScenarioOutcome {
                stages: reports,
                result: Err(e),
            };
        }

        for (stage, report) in stages.iter().zip(reports.iter_mut()) {
            info!("Stage {}: {} ({:?})", stage.name, self.identity.name, stage.submit);
            let started = Instant::now();
            let mut progress = StageProgress::default();

            let result = self.run_stage(stage, &mut progress).await;

            report.polls = progress.polls;
            report.runs_observed = progress.runs_observed;
            report.duration_secs = started.elapsed().as_secs_f64();

            match result {
                Ok(()) => {
                    info!("Stage {} succeeded", stage.name);
                    report.status = StageStatus::Succeeded;
                }
                Err(e) => {
                    error!("Stage {} failed: {e}", stage.name);
                    report.status = StageStatus::Failed;
                    report.error = Some(e.to_string());
                    return ScenarioOutcome {
                        stages: reports,
                        result: Err(e),
                    };
                }
            }
        }

        ScenarioOutcome {
            stages: reports,
            result: Ok(()),
        }
    }

    /// Runs the scenario, then hands over to the janitor when one is given.
    ///
    /// Cleanup runs whatever the stages did and never replaces their result.
    /// `before_cleanup` is told whether the stages succeeded.
    pub async fn run_then_clean_up(
        &self,
        janitor: Option<&Janitor<'_>>,
        before_cleanup: impl FnOnce(bool),
    ) -> (ScenarioOutcome, Option<CleanupReport>) {
        let outcome = self.run().await;

        let Some(janitor) = janitor else {
            warn!("Keeping resources of {}", self.identity.name);
            return (outcome, None);
        };

        before_cleanup(outcome.result.is_ok());
        let cleanup = janitor.cleanup(self.identity).await;
        (outcome, Some(cleanup))
    }

    async fn prepare_data(&self) -> Result<()> {
        let local = self
            .template_dir
            .join(&self.config.settings.storage.local_data_file);
        let remote = format!(
            "{}/{DATA_OBJECT}",
            self.config.data_prefix(&self.identity.name)
        );
        info!("Uploading {} to gs://{}/{remote}", local.display(), self.config.bucket);
        self.storage.upload(&self.config.bucket, &remote, &local).await
    }

    async fn run_stage(&self, stage: &ScenarioStage, progress: &mut StageProgress) -> Result<()> {
        for transform in &stage.transforms {
            transform.apply(self.template_dir)?;
        }

        let pipeline_path = &self.config.settings.tfx.pipeline_path;
        let submitted = match stage.submit {
            SubmitKind::Create => {
                self.lifecycle
                    .create(
                        pipeline_path,
                        self.endpoint,
                        &self.identity.target_image,
                        &self.config.settings.tfx.base_image,
                    )
                    .await?
            }
            SubmitKind::Update => self.lifecycle.update(pipeline_path, self.endpoint).await?,
        };
        submitted.check()?;

        self.lifecycle
            .submit_run(&self.identity.name, self.endpoint)
            .await?
            .check()?;

        let outcome = self.poller.wait(self.runs, &self.identity.name).await?;
        progress.polls = outcome.polls();
        progress.runs_observed = outcome.check(&self.identity.name)?;

        for assertion in &stage.assertions {
            match assertion {
                Assertion::TelemetryLabel => telemetry::check_archive(&self.packaged_definition())?,
            }
        }

        Ok(())
    }

    /// Where the CLI leaves the packaged definition of the pipeline.
    fn packaged_definition(&self) -> PathBuf {
        self.template_dir
            .join(format!("{}.tar.gz", self.identity.name))
    }
}

fn not_run(stage: &ScenarioStage) -> StageReport {
    StageReport {
        name: stage.name.to_string(),
        submit: stage.submit,
        status: StageStatus::NotRun,
        runs_observed: 0,
        polls: 0,
        duration_secs: 0.0,
        error: None,
    }
}
