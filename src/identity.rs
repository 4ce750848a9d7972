use chrono::Local;
use rand::Rng;

use crate::config::HarnessConfig;

/// Name and image shared by every remote resource a single run creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineIdentity {
    pub name: String,
    pub target_image: String,
}

impl PipelineIdentity {
    /// Generates a fresh identity from the configured prefix and a random suffix.
    pub fn generate(config: &HarnessConfig) -> Self {
        let name = format!("{}{}", config.settings.scenario.pipeline_prefix, random_id());
        Self::for_name(config, name)
    }

    /// Rebuilds the identity of an existing pipeline, e.g. for a standalone cleanup.
    pub fn for_name(config: &HarnessConfig, name: String) -> Self {
        let target_image = format!("gcr.io/{}/{name}", config.project_id);
        Self { name, target_image }
    }
}

fn random_id() -> String {
    let suffix: u32 = rand::rng().random_range(0..1_000_000);
    format!("{}-{suffix}", Local::now().format("%Y%m%d-%H%M%S"))
}
