use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::HarnessError;

/// Environment variable holding the GCP project the test runs in.
pub const PROJECT_ID_ENV: &str = "KFP_E2E_GCP_PROJECT_ID";

/// Environment variable holding the GCP region the test runs in.
pub const REGION_ENV: &str = "KFP_E2E_GCP_REGION";

/// Settings file structure for kfp-lifecycle.
///
/// Everything here has a working default, so the file is optional. Values that
/// identify the cloud project come from the environment instead, see
/// [`HarnessConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(default)]
    pub scenario: ScenarioSettings,

    #[serde(default)]
    pub kubeflow: KubeflowSettings,

    #[serde(default)]
    pub tfx: TfxSettings,

    #[serde(default)]
    pub polling: PollingSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScenarioSettings {
    /// Fixed prefix of every generated pipeline name
    #[serde(default = "default_pipeline_prefix")]
    pub pipeline_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KubeflowSettings {
    /// Pipelines endpoint; discovered from the cluster when absent
    pub endpoint: Option<String>,

    /// Namespace holding the inverse proxy config map
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Bearer token for the Pipelines REST API
    pub token: Option<String>,

    /// Engine flag passed to the tfx CLI
    #[serde(default = "default_engine")]
    pub engine: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TfxSettings {
    #[serde(default = "default_tfx_command")]
    pub command: String,

    #[serde(default = "default_skaffold_command")]
    pub skaffold_command: String,

    #[serde(default = "default_base_image")]
    pub base_image: String,

    /// Runner file, relative to the template directory
    #[serde(default = "default_pipeline_path")]
    pub pipeline_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollingSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageSettings {
    /// Bucket prefix under which per-run input data is staged
    #[serde(default = "default_data_directory")]
    pub data_directory: String,

    /// Bucket prefix under which pipelines write their artifacts
    #[serde(default = "default_output_directory")]
    pub output_directory: String,

    /// Input data inside the template directory
    #[serde(default = "default_local_data_file")]
    pub local_data_file: String,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            pipeline_prefix: default_pipeline_prefix(),
        }
    }
}

impl Default for KubeflowSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            namespace: default_namespace(),
            token: None,
            engine: default_engine(),
        }
    }
}

impl Default for TfxSettings {
    fn default() -> Self {
        Self {
            command: default_tfx_command(),
            skaffold_command: default_skaffold_command(),
            base_image: default_base_image(),
            pipeline_path: default_pipeline_path(),
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_polls: default_max_polls(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
            output_directory: default_output_directory(),
            local_data_file: default_local_data_file(),
        }
    }
}

fn default_pipeline_prefix() -> String {
    "taxi-template-kubeflow-e2e-test-".to_string()
}

fn default_namespace() -> String {
    "kubeflow".to_string()
}

fn default_engine() -> String {
    "kubeflow".to_string()
}

fn default_tfx_command() -> String {
    "tfx".to_string()
}

fn default_skaffold_command() -> String {
    "skaffold".to_string()
}

fn default_base_image() -> String {
    "tensorflow/tfx:latest".to_string()
}

fn default_pipeline_path() -> String {
    "kubeflow_dag_runner.py".to_string()
}

fn default_interval_secs() -> u64 {
    10
}

fn default_max_polls() -> u32 {
    // 20 minutes at the default interval
    20 * 6
}

fn default_data_directory() -> String {
    "template_data".to_string()
}

fn default_output_directory() -> String {
    "tfx_pipeline_output".to_string()
}

fn default_local_data_file() -> String {
    "data/data.csv".to_string()
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Settings {
    /// Load settings from a file.
    ///
    /// Searches for settings files in this order:
    /// 1. Specified path
    /// 2. ./kfp-lifecycle.toml
    /// 3. ./kfp-lifecycle.json
    /// 4. ./kfp-lifecycle.yaml
    /// 5. ./kfp-lifecycle.yml
    ///
    /// Returns default settings if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "kfp-lifecycle.toml",
            "kfp-lifecycle.json",
            "kfp-lifecycle.yaml",
            "kfp-lifecycle.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML settings: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON settings: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML settings: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse settings file: {}", path.display())),
        }
    }
}

/// Process-wide configuration, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub settings: Settings,
    pub project_id: String,
    pub region: String,
    /// Bucket receiving pipeline outputs and staged input data
    pub bucket: String,
}

impl HarnessConfig {
    /// Builds the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::MissingEnv`] when the project or region variable
    /// is unset or empty.
    pub fn from_env(settings: Settings) -> crate::error::Result<Self> {
        Self::from_lookup(settings, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(settings: Settings, lookup: F) -> crate::error::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| HarnessError::MissingEnv(key.to_string()))
        };

        let project_id = required(PROJECT_ID_ENV)?;
        let region = required(REGION_ENV)?;

        if settings.polling.max_polls == 0 {
            return Err(HarnessError::Config(
                "polling.max-polls must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bucket: format!("{project_id}-kubeflowpipelines-default"),
            settings,
            project_id,
            region,
        })
    }

    /// Prefix holding a pipeline's staged input data.
    pub fn data_prefix(&self, pipeline_name: &str) -> String {
        format!("{}/{pipeline_name}", self.settings.storage.data_directory)
    }

    /// Prefix holding a pipeline's output artifacts.
    pub fn output_prefix(&self, pipeline_name: &str) -> String {
        format!("{}/{pipeline_name}", self.settings.storage.output_directory)
    }
}
