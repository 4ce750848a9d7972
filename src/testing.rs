//! Recording fakes for the collaborator traits.
//!
//! Every fake can share one [`CallLog`] so tests can assert on the global order
//! of calls across collaborators.

use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{HarnessError, Result};
use crate::providers::{
    CommandOutcome, ImageRegistry, LifecycleClient, ObjectStore, RunRecord, RunStatus, RunStore,
};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn record(log: &CallLog, call: impl Into<String>) {
    log.lock().unwrap().push(call.into());
}

fn injected(call: &str) -> HarnessError {
    HarnessError::CommandFailed {
        command: format!("fake {call}"),
        status: 1,
    }
}

/// Run store replaying scripted snapshots; the last snapshot repeats.
#[derive(Default)]
pub struct FakeRunStore {
    snapshots: Mutex<VecDeque<Vec<RunRecord>>>,
    current: Mutex<Vec<RunRecord>>,
    list_calls: AtomicUsize,
    fail_listing: AtomicBool,
    failing_deletes: Mutex<HashSet<String>>,
    log: CallLog,
}

impl FakeRunStore {
    pub fn scripted(snapshots: Vec<Vec<RunRecord>>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into()),
            ..Self::default()
        }
    }

    pub fn always(runs: Vec<RunRecord>) -> Self {
        Self {
            current: Mutex::new(runs),
            ..Self::default()
        }
    }

    pub fn with_log(mut self, log: &CallLog) -> Self {
        self.log = Arc::clone(log);
        self
    }

    pub fn push(&self, run: RunRecord) {
        self.current.lock().unwrap().push(run);
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, run_id: &str) {
        self.failing_deletes.lock().unwrap().insert(run_id.to_string());
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.current.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunStore for FakeRunStore {
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        record(&self.log, format!("list_runs:{pipeline_name}"));

        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(injected("list_runs"));
        }

        let mut current = self.current.lock().unwrap();
        if let Some(next) = self.snapshots.lock().unwrap().pop_front() {
            *current = next;
        }
        Ok(current.clone())
    }

    async fn delete_run(&self, run_id: &str) -> Result<()> {
        record(&self.log, format!("delete_run:{run_id}"));

        if self.failing_deletes.lock().unwrap().contains(run_id) {
            return Err(injected("delete_run"));
        }
        self.current.lock().unwrap().retain(|run| run.id != run_id);
        Ok(())
    }
}

/// Lifecycle client that records calls and exits 0 unless told otherwise.
///
/// With a package directory set, `create` and `update` write a packaged
/// definition carrying the template label there, as the real CLI does. With a
/// run store set, every submission adds a succeeded run to it.
#[derive(Default)]
pub struct FakeLifecycle {
    log: CallLog,
    failing: Mutex<HashSet<String>>,
    package: Option<(PathBuf, String)>,
    runs: Option<Arc<FakeRunStore>>,
}

impl FakeLifecycle {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: Arc::clone(log),
            ..Self::default()
        }
    }

    pub fn packaging_into(mut self, dir: &Path, pipeline_name: &str) -> Self {
        self.package = Some((dir.to_path_buf(), pipeline_name.to_string()));
        self
    }

    pub fn submitting_to(mut self, runs: Arc<FakeRunStore>) -> Self {
        self.runs = Some(runs);
        self
    }

    /// Makes the named operation exit with status 1.
    pub fn fail(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    fn outcome(&self, operation: &str) -> CommandOutcome {
        record(&self.log, operation);
        let code = if self.failing.lock().unwrap().contains(operation) {
            1
        } else {
            0
        };
        CommandOutcome {
            command: format!("fake {operation}"),
            code: Some(code),
        }
    }

    fn package(&self) {
        if let Some((dir, name)) = &self.package {
            write_pipeline_archive(
                &dir.join(format!("{name}.tar.gz")),
                &labelled_workflow("tfx-template"),
            );
        }
    }
}

#[async_trait]
impl LifecycleClient for FakeLifecycle {
    async fn create(
        &self,
        _pipeline_path: &str,
        _endpoint: &str,
        _target_image: &str,
        _base_image: &str,
    ) -> Result<CommandOutcome> {
        let outcome = self.outcome("create");
        if outcome.success() {
            self.package();
        }
        Ok(outcome)
    }

    async fn update(&self, _pipeline_path: &str, _endpoint: &str) -> Result<CommandOutcome> {
        let outcome = self.outcome("update");
        if outcome.success() {
            self.package();
        }
        Ok(outcome)
    }

    async fn submit_run(&self, _pipeline_name: &str, _endpoint: &str) -> Result<CommandOutcome> {
        let outcome = self.outcome("submit_run");
        if let (true, Some(runs)) = (outcome.success(), &self.runs) {
            let id = format!("run-{}", runs.runs().len() + 1);
            runs.push(RunRecord::new(id, RunStatus::Succeeded));
        }
        Ok(outcome)
    }

    async fn delete(&self, _pipeline_name: &str, _endpoint: &str) -> Result<CommandOutcome> {
        Ok(self.outcome("delete_pipeline"))
    }
}

#[derive(Default)]
pub struct FakeObjectStore {
    log: CallLog,
    failing: AtomicBool,
}

impl FakeObjectStore {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: Arc::clone(log),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn outcome(&self, call: String) -> Result<()> {
        record(&self.log, call.clone());
        if self.failing.load(Ordering::SeqCst) {
            Err(injected(&call))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn upload(&self, bucket: &str, path: &str, _local_file: &Path) -> Result<()> {
        self.outcome(format!("upload:{bucket}/{path}"))
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<()> {
        self.outcome(format!("delete_prefix:{bucket}/{prefix}"))
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    log: CallLog,
    failing: AtomicBool,
}

impl FakeRegistry {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: Arc::clone(log),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageRegistry for FakeRegistry {
    async fn delete_image(&self, reference: &str) -> Result<()> {
        record(&self.log, format!("delete_image:{reference}"));
        if self.failing.load(Ordering::SeqCst) {
            Err(injected("delete_image"))
        } else {
            Ok(())
        }
    }
}

/// A compiled workflow with one DAG entry and two container templates.
pub fn labelled_workflow(label: &str) -> String {
    format!(
        "\
apiVersion: argoproj.io/v1alpha1
kind: Workflow
spec:
  entrypoint: pipeline
  templates:
  - name: pipeline
    dag:
      tasks:
      - name: csvexamplegen
        template: csvexamplegen
  - name: csvexamplegen
    metadata:
      labels:
        pipelines.kubeflow.org/pipeline-sdk-type: {label}
    container:
      image: gcr.io/p/name
  - name: statisticsgen
    metadata:
      labels:
        pipelines.kubeflow.org/pipeline-sdk-type: {label}
    container:
      image: gcr.io/p/name
"
    )
}

/// Writes a gzip tarball holding `pipeline.yaml`, like `tfx pipeline create` does.
pub fn write_pipeline_archive(path: &Path, pipeline_yaml: &str) {
    let file = File::create(path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut header = tar::Header::new_gnu();
    header.set_size(pipeline_yaml.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "pipeline.yaml", pipeline_yaml.as_bytes())
        .unwrap();

    builder.into_inner().unwrap().finish().unwrap();
}
