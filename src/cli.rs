use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::{Path, PathBuf};

use crate::auth::Token;
use crate::config::{HarnessConfig, Settings};
use crate::error::Result as HarnessResult;
use crate::identity::PipelineIdentity;
use crate::janitor::Janitor;
use crate::output::{print_summary, PhaseProgress};
use crate::poller::RunPoller;
use crate::providers::{discover_endpoint, GcrRegistry, GcsStore, KubeflowClient, TfxCli};
use crate::report::{CleanupReport, ScenarioReport};
use crate::scenario::Scenario;

#[derive(Parser)]
#[command(name = "kfp-lifecycle")]
#[command(author, version, about = "TFX template lifecycle harness for Kubeflow Pipelines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to ./kfp-lifecycle.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Where to write the JSON report (stdout otherwise)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the four-stage scenario against a generated template, then clean up
    Run {
        /// Working copy of the generated template; it is modified in place
        #[arg(short = 'd', long)]
        template_dir: PathBuf,

        /// Kubeflow Pipelines endpoint (discovered through kubectl when absent)
        #[arg(short, long)]
        endpoint: Option<String>,

        #[arg(short, long, env = "KFP_BEARER_TOKEN")]
        token: Option<String>,

        /// Leave the pipeline, runs, image and artifacts in place
        #[arg(short, long, default_value_t = false)]
        keep_resources: bool,
    },
    /// Remove every resource of a previously created pipeline
    Cleanup {
        #[arg(short = 'n', long)]
        pipeline_name: String,

        /// Working directory for the tfx CLI
        #[arg(short = 'd', long, default_value = ".")]
        template_dir: PathBuf,

        #[arg(short, long)]
        endpoint: Option<String>,

        #[arg(short, long, env = "KFP_BEARER_TOKEN")]
        token: Option<String>,
    },
}

/// Collaborators backed by the real command-line tools and REST API.
struct Providers {
    lifecycle: TfxCli,
    runs: KubeflowClient,
    storage: GcsStore,
    registry: GcrRegistry,
}

impl Providers {
    fn new(
        config: &HarnessConfig,
        template_dir: &Path,
        endpoint: &str,
        token: Option<Token>,
    ) -> Result<Self> {
        Ok(Self {
            lifecycle: TfxCli::new(config, template_dir),
            runs: KubeflowClient::new(endpoint, token)
                .context("Failed to create Kubeflow Pipelines client")?,
            storage: GcsStore::new(),
            registry: GcrRegistry::new(),
        })
    }

    fn janitor<'a>(&'a self, config: &'a HarnessConfig, endpoint: &'a str) -> Janitor<'a> {
        Janitor::new(
            config,
            endpoint,
            &self.lifecycle,
            &self.runs,
            &self.storage,
            &self.registry,
        )
    }
}

impl Cli {
    fn load_config(&self) -> Result<HarnessConfig> {
        let settings = Settings::load(self.config.as_deref())?;
        HarnessConfig::from_env(settings).context("Invalid harness environment")
    }

    async fn resolve_endpoint(config: &HarnessConfig, endpoint: &Option<String>) -> Result<String> {
        if let Some(endpoint) = endpoint.as_ref().or(config.settings.kubeflow.endpoint.as_ref()) {
            return Ok(endpoint.clone());
        }

        info!(
            "No endpoint configured, discovering it in namespace {}",
            config.settings.kubeflow.namespace
        );
        let endpoint = discover_endpoint(&config.settings.kubeflow.namespace)
            .await
            .context("Failed to discover the Kubeflow Pipelines endpoint")?;
        info!("Using endpoint {endpoint}");
        Ok(endpoint)
    }

    fn token(config: &HarnessConfig, token: &Option<String>) -> Option<Token> {
        token
            .as_ref()
            .or(config.settings.kubeflow.token.as_ref())
            .map(|t| Token::from(t.as_str()))
    }

    fn emit_report(&self, report: &ScenarioReport) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output).with_context(|| {
                format!("Failed to write report to {}", output_path.display())
            })?;
            info!("Report written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }

    async fn execute_run(
        &self,
        template_dir: &Path,
        endpoint: &Option<String>,
        token: &Option<String>,
        keep_resources: bool,
    ) -> Result<()> {
        let config = self.load_config()?;
        if !template_dir.is_dir() {
            anyhow::bail!("Template directory {} does not exist", template_dir.display());
        }

        let endpoint = Self::resolve_endpoint(&config, endpoint).await?;
        let identity = PipelineIdentity::generate(&config);
        info!("Testing pipeline {} on {endpoint}", identity.name);

        let providers = Providers::new(
            &config,
            template_dir,
            &endpoint,
            Self::token(&config, token),
        )?;

        let started_at = Utc::now();
        let total_phases = if keep_resources { 1 } else { 2 };
        let mut progress = Some(PhaseProgress::start(total_phases, "Running lifecycle stages"));

        let scenario = Scenario::new(
            &config,
            &identity,
            &endpoint,
            template_dir,
            &providers.lifecycle,
            &providers.runs,
            &providers.storage,
            RunPoller::from_settings(&config.settings.polling),
        );
        let janitor = (!keep_resources).then(|| providers.janitor(&config, &endpoint));
        let (outcome, cleanup) = scenario
            .run_then_clean_up(janitor.as_ref(), |succeeded| {
                progress = progress.take().map(|p| {
                    p.next("Lifecycle stages finished", succeeded, "Cleaning up remote resources")
                });
            })
            .await;
        let succeeded = outcome.result.is_ok();

        if let Some(progress) = progress {
            match &cleanup {
                Some(cleanup) => {
                    progress.finish("Cleanup finished", cleanup.failed_steps().next().is_none())
                }
                None => progress.finish("Lifecycle stages finished", succeeded),
            }
        }

        let report = ScenarioReport {
            pipeline_name: identity.name.clone(),
            target_image: identity.target_image.clone(),
            endpoint,
            started_at,
            finished_at: Utc::now(),
            succeeded,
            failure: outcome.result.as_ref().err().map(ToString::to_string),
            stages: outcome.stages,
            cleanup,
        };

        self.conclude(&report, outcome.result)
    }

    /// Prints and emits the report, then returns the scenario result.
    ///
    /// A report that cannot be written is only logged, so it never masks how
    /// the scenario itself went.
    fn conclude(&self, report: &ScenarioReport, result: HarnessResult<()>) -> Result<()> {
        print_summary(report);
        if let Err(e) = self.emit_report(report) {
            error!("Failed to emit the report: {e:#}");
        }

        result.with_context(|| format!("Lifecycle scenario for {} failed", report.pipeline_name))
    }

    async fn execute_cleanup(
        &self,
        pipeline_name: &str,
        template_dir: &Path,
        endpoint: &Option<String>,
        token: &Option<String>,
    ) -> Result<()> {
        let config = self.load_config()?;
        let endpoint = Self::resolve_endpoint(&config, endpoint).await?;
        let identity = PipelineIdentity::for_name(&config, pipeline_name.to_string());

        let providers = Providers::new(
            &config,
            template_dir,
            &endpoint,
            Self::token(&config, token),
        )?;

        let progress = PhaseProgress::start(1, "Cleaning up remote resources");
        let cleanup: CleanupReport = providers.janitor(&config, &endpoint).cleanup(&identity).await;
        let failed = cleanup.failed_steps().count();
        progress.finish("Cleanup finished", failed == 0);

        let now = Utc::now();
        let report = ScenarioReport {
            pipeline_name: identity.name,
            target_image: identity.target_image,
            endpoint,
            started_at: now,
            finished_at: now,
            succeeded: failed == 0,
            failure: None,
            stages: Vec::new(),
            cleanup: Some(cleanup),
        };

        print_summary(&report);
        self.emit_report(&report)
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Run {
                template_dir,
                endpoint,
                token,
                keep_resources,
            } => {
                self.execute_run(template_dir, endpoint, token, *keep_resources)
                    .await
            }
            Commands::Cleanup {
                pipeline_name,
                template_dir,
                endpoint,
                token,
            } => {
                self.execute_cleanup(pipeline_name, template_dir, endpoint, token)
                    .await
            }
        }
    }
}
