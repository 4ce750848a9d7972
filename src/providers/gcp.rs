use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use super::command::{render, run};
use super::{ImageRegistry, ObjectStore};
use crate::error::Result;

/// Cloud Storage access through `gsutil`.
pub struct GcsStore {
    program: String,
}

impl GcsStore {
    pub fn new() -> Self {
        Self::with_program("gsutil")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn gsutil(&self, args: Vec<String>) -> Result<()> {
        let rendered = render(&self.program, &args);
        let mut command = Command::new(&self.program);
        command.args(&args);
        run(command, rendered).await?.check()
    }
}

impl Default for GcsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn object_url(bucket: &str, path: &str) -> String {
    format!("gs://{bucket}/{}", path.trim_start_matches('/'))
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn upload(&self, bucket: &str, path: &str, local_file: &Path) -> Result<()> {
        self.gsutil(vec![
            "cp".to_string(),
            local_file.display().to_string(),
            object_url(bucket, path),
        ])
        .await
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<()> {
        self.gsutil(vec![
            "-m".to_string(),
            "rm".to_string(),
            "-r".to_string(),
            object_url(bucket, prefix),
        ])
        .await
    }
}

/// Container Registry access through `gcloud`.
pub struct GcrRegistry {
    program: String,
}

impl GcrRegistry {
    pub fn new() -> Self {
        Self::with_program("gcloud")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GcrRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageRegistry for GcrRegistry {
    async fn delete_image(&self, reference: &str) -> Result<()> {
        let args: Vec<String> = [
            "container",
            "images",
            "delete",
            reference,
            "--force-delete-tags",
            "--quiet",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        let rendered = render(&self.program, &args);
        let mut command = Command::new(&self.program);
        command.args(&args);
        run(command, rendered).await?.check()
    }
}
