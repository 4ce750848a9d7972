use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use log::info;
use serde::Deserialize;

use crate::error::{HarnessError, Result};

/// Label key the tfx CLI stamps on every component template.
pub const LABEL_KFP_SDK_ENV: &str = "pipelines.kubeflow.org/pipeline-sdk-type";

/// Value expected for pipelines generated from a template.
pub const TEMPLATE_SDK_ENV: &str = "tfx-template";

const PIPELINE_DOCUMENT: &str = "pipeline.yaml";

#[derive(Debug, Deserialize)]
struct Workflow {
    spec: WorkflowSpec,
}

#[derive(Debug, Deserialize)]
struct WorkflowSpec {
    #[serde(default)]
    templates: Vec<Template>,
}

#[derive(Debug, Deserialize)]
struct Template {
    #[serde(default)]
    name: String,
    dag: Option<serde_yaml::Value>,
    #[serde(default)]
    metadata: TemplateMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct TemplateMetadata {
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

/// Extracts `pipeline.yaml` from a packaged (gzip tar) pipeline definition.
pub fn read_pipeline_document(archive: &Path) -> Result<String> {
    if !archive.exists() {
        return Err(HarnessError::Telemetry(format!(
            "packaged pipeline {} does not exist",
            archive.display()
        )));
    }

    let mut tarball = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    for entry in tarball.entries()? {
        let mut entry = entry?;
        if entry.path()?.ends_with(PIPELINE_DOCUMENT) {
            let mut document = String::new();
            entry.read_to_string(&mut document)?;
            return Ok(document);
        }
    }

    Err(HarnessError::Telemetry(format!(
        "{PIPELINE_DOCUMENT} not found in {}",
        archive.display()
    )))
}

/// Verifies that every non-DAG template of a compiled pipeline carries the
/// template SDK label. Returns how many templates were checked.
pub fn check_labels(pipeline_yaml: &str) -> Result<usize> {
    let workflow: Workflow = serde_yaml::from_str(pipeline_yaml)?;

    let components: Vec<&Template> = workflow
        .spec
        .templates
        .iter()
        .filter(|template| template.dag.is_none())
        .collect();

    if components.is_empty() {
        return Err(HarnessError::Telemetry(
            "pipeline has no component templates".to_string(),
        ));
    }

    for template in &components {
        match template.metadata.labels.get(LABEL_KFP_SDK_ENV) {
            Some(value) if value == TEMPLATE_SDK_ENV => {}
            Some(value) => {
                return Err(HarnessError::Telemetry(format!(
                    "template {} has {LABEL_KFP_SDK_ENV}={value}, expected {TEMPLATE_SDK_ENV}",
                    template.name
                )))
            }
            None => {
                return Err(HarnessError::Telemetry(format!(
                    "template {} has no {LABEL_KFP_SDK_ENV} label",
                    template.name
                )))
            }
        }
    }

    Ok(components.len())
}

/// Checks the telemetry label of a packaged pipeline definition.
pub fn check_archive(archive: &Path) -> Result<()> {
    let document = read_pipeline_document(archive)?;
    let checked = check_labels(&document)?;
    info!(
        "{checked} templates in {} carry {LABEL_KFP_SDK_ENV}={TEMPLATE_SDK_ENV}",
        archive.display()
    );
    Ok(())
}
