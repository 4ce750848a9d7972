use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use super::command::{render, run};
use super::types::CommandOutcome;
use super::LifecycleClient;
use crate::config::HarnessConfig;
use crate::error::Result;

/// Lifecycle client backed by the `tfx` command-line tool.
///
/// Every invocation runs inside the template directory, where the CLI also
/// writes the packaged pipeline definition, with `KUBEFLOW_HOME` isolated to
/// that directory.
pub struct TfxCli {
    program: String,
    engine: String,
    skaffold: String,
    working_dir: PathBuf,
    kubeflow_home: PathBuf,
}

impl TfxCli {
    pub fn new(config: &HarnessConfig, working_dir: &Path) -> Self {
        let settings = &config.settings;
        Self {
            program: settings.tfx.command.clone(),
            engine: settings.kubeflow.engine.clone(),
            skaffold: settings.tfx.skaffold_command.clone(),
            working_dir: working_dir.to_path_buf(),
            kubeflow_home: working_dir.join(".kubeflow"),
        }
    }

    fn create_args(
        &self,
        pipeline_path: &str,
        endpoint: &str,
        target_image: &str,
        base_image: &str,
    ) -> Vec<String> {
        let mut args = self.base_args(&["pipeline", "create"]);
        args.extend(flags(&[
            ("--pipeline_path", pipeline_path),
            ("--endpoint", endpoint),
            ("--build-target-image", target_image),
            ("--skaffold-cmd", &self.skaffold),
            ("--build-base-image", base_image),
        ]));
        args
    }

    fn update_args(&self, pipeline_path: &str, endpoint: &str) -> Vec<String> {
        let mut args = self.base_args(&["pipeline", "update"]);
        args.extend(flags(&[
            ("--pipeline_path", pipeline_path),
            ("--endpoint", endpoint),
            ("--skaffold-cmd", &self.skaffold),
        ]));
        args
    }

    fn run_args(&self, pipeline_name: &str, endpoint: &str) -> Vec<String> {
        let mut args = self.base_args(&["run", "create"]);
        args.extend(flags(&[
            ("--pipeline_name", pipeline_name),
            ("--endpoint", endpoint),
        ]));
        args
    }

    fn delete_args(&self, pipeline_name: &str, endpoint: &str) -> Vec<String> {
        let mut args = self.base_args(&["pipeline", "delete"]);
        args.extend(flags(&[
            ("--pipeline_name", pipeline_name),
            ("--endpoint", endpoint),
        ]));
        args
    }

    fn base_args(&self, command: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = command.iter().map(ToString::to_string).collect();
        args.push("--engine".to_string());
        args.push(self.engine.clone());
        args
    }

    async fn invoke(&self, args: Vec<String>) -> Result<CommandOutcome> {
        let rendered = render(&self.program, &args);

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .current_dir(&self.working_dir)
            .env("KUBEFLOW_HOME", &self.kubeflow_home);

        run(command, rendered).await
    }
}

fn flags(pairs: &[(&str, &str)]) -> Vec<String> {
    pairs
        .iter()
        .flat_map(|(flag, value)| [(*flag).to_string(), (*value).to_string()])
        .collect()
}

#[async_trait]
impl LifecycleClient for TfxCli {
    async fn create(
        &self,
        pipeline_path: &str,
        endpoint: &str,
        target_image: &str,
        base_image: &str,
    ) -> Result<CommandOutcome> {
        self.invoke(self.create_args(pipeline_path, endpoint, target_image, base_image))
            .await
    }

    async fn update(&self, pipeline_path: &str, endpoint: &str) -> Result<CommandOutcome> {
        self.invoke(self.update_args(pipeline_path, endpoint)).await
    }

    async fn submit_run(&self, pipeline_name: &str, endpoint: &str) -> Result<CommandOutcome> {
        self.invoke(self.run_args(pipeline_name, endpoint)).await
    }

    async fn delete(&self, pipeline_name: &str, endpoint: &str) -> Result<CommandOutcome> {
        self.invoke(self.delete_args(pipeline_name, endpoint)).await
    }
}
