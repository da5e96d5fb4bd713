//! # upload: concurrent artifact transfer
//!
//! Uploads happen in three ordered phases:
//!
//! 1. every deployment descriptor found in the staging directory;
//! 2. every unit-specific artifact, concurrently;
//! 3. the shared service artifact, if the plan needs it.
//!
//! Each phase is a bounded concurrent batch ([`upload_all`]). After the first
//! failure no further task of the batch is started; tasks already in flight
//! finish on their own and their outcomes are recorded. The returned
//! [`UploadReport`] has an entry for every task.

use std::fs;
use std::path::{Path, PathBuf};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::UploadError;
use crate::naming::ArtifactNaming;
use crate::plan::{PlannedArtifact, UploadPlan};
use crate::store::{ObjectStore, PutObject};

/// MIME type of deployment descriptor files.
pub const DESCRIPTOR_CONTENT_TYPE: &str = "application/json";

/// Concurrent uploads per batch unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Where and how artifacts are uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket: String,
    /// Key prefix shared by every object of this deployment.
    pub artifact_directory: String,
    /// Local directory holding built artifacts and descriptors.
    pub staging_dir: PathBuf,
    pub concurrency: usize,
}

impl UploadTarget {
    /// Remote key of a file: `<artifact_directory>/<file_name>`.
    pub fn key_for(&self, file_name: &str) -> String {
        let prefix = self.artifact_directory.trim_end_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{prefix}/{file_name}")
        }
    }

    fn task(&self, source: &Path, content_type: &str) -> UploadTask {
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        UploadTask {
            bucket: self.bucket.clone(),
            key: self.key_for(&file_name),
            content_type: content_type.to_string(),
            source: source.to_path_buf(),
        }
    }

    fn artifact_task(&self, artifact: &PlannedArtifact) -> UploadTask {
        self.task(&artifact.path, artifact.content_type)
    }
}

/// A single transfer of a local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTask {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub source: PathBuf,
}

/// What happened to one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskOutcome {
    Uploaded { bytes: u64 },
    Failed { reason: String },
    /// Not started because an earlier task of the batch failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    pub key: String,
    pub outcome: TaskOutcome,
}

/// Outcomes of a batch, in task order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub results: Vec<TaskResult>,
}

impl UploadReport {
    pub fn uploaded(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Uploaded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Skipped))
    }

    pub fn outcome(&self, key: &str) -> Option<&TaskOutcome> {
        self.results
            .iter()
            .find(|result| result.key == key)
            .map(|result| &result.outcome)
    }

    fn count(&self, predicate: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Reports of every upload phase of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub descriptors: UploadReport,
    pub units: UploadReport,
    pub service: Option<UploadReport>,
}

async fn run_task<S>(store: &S, task: &UploadTask) -> TaskOutcome
where
    S: ObjectStore + ?Sized,
{
    let body = match tokio::fs::read(&task.source).await {
        Ok(body) => body,
        Err(e) => {
            error!(source = %task.source.display(), error = %e, "Failed to read upload source");
            return TaskOutcome::Failed {
                reason: format!("failed to read {}: {e}", task.source.display()),
            };
        }
    };
    let bytes = body.len() as u64;

    info!(bucket = %task.bucket, key = %task.key, bytes, "Upload started");
    let request = PutObject {
        bucket: task.bucket.clone(),
        key: task.key.clone(),
        content_type: task.content_type.clone(),
        body,
    };
    match store.put(request).await {
        Ok(()) => {
            info!(key = %task.key, bytes, "Upload finished");
            TaskOutcome::Uploaded { bytes }
        }
        Err(e) => {
            error!(key = %task.key, error = %e, "Upload failed");
            TaskOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// Upload `tasks` with at most `concurrency` transfers in flight.
///
/// Fails with [`UploadError::Batch`] if any task fails; the error carries
/// the first failure and the full report.
pub async fn upload_all<S>(
    store: &S,
    tasks: &[UploadTask],
    concurrency: usize,
) -> Result<UploadReport, UploadError>
where
    S: ObjectStore + ?Sized,
{
    let limit = concurrency.max(1);
    let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; tasks.len()];
    let mut pending = tasks.iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut first_failure: Option<(String, String)> = None;

    loop {
        while first_failure.is_none() && in_flight.len() < limit {
            match pending.next() {
                Some((index, task)) => {
                    in_flight.push(async move { (index, run_task(store, task).await) })
                }
                None => break,
            }
        }

        let Some((index, outcome)) = in_flight.next().await else {
            break;
        };
        if let TaskOutcome::Failed { reason } = &outcome {
            if first_failure.is_none() {
                first_failure = Some((tasks[index].key.clone(), reason.clone()));
                if !in_flight.is_empty() {
                    warn!(
                        in_flight = in_flight.len(),
                        "Upload failed, waiting for in-flight uploads without starting new ones"
                    );
                }
            }
        }
        outcomes[index] = Some(outcome);
    }

    let report = UploadReport {
        results: tasks
            .iter()
            .zip(outcomes)
            .map(|(task, outcome)| TaskResult {
                key: task.key.clone(),
                outcome: outcome.unwrap_or(TaskOutcome::Skipped),
            })
            .collect(),
    };

    match first_failure {
        Some((key, reason)) => {
            error!(
                uploaded = report.uploaded(),
                failed = report.failed(),
                skipped = report.skipped(),
                "Upload batch failed"
            );
            Err(UploadError::Batch {
                key,
                reason,
                report,
            })
        }
        None => Ok(report),
    }
}

/// Descriptor files in the staging directory, sorted by name.
pub fn find_descriptors(
    staging_dir: &Path,
    naming: &dyn ArtifactNaming,
) -> Result<Vec<PathBuf>, UploadError> {
    let listing_error = |source| UploadError::StagingDir {
        path: staging_dir.to_path_buf(),
        source,
    };
    let mut descriptors = Vec::new();
    for entry in fs::read_dir(staging_dir).map_err(listing_error)? {
        let entry = entry.map_err(listing_error)?;
        let is_file = entry.file_type().map_err(listing_error)?.is_file();
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_file && naming.is_descriptor_file(&name) {
            descriptors.push(entry.path());
        }
    }
    descriptors.sort();
    Ok(descriptors)
}

/// Upload every descriptor file of the staging directory.
pub async fn upload_descriptors<S>(
    store: &S,
    target: &UploadTarget,
    naming: &dyn ArtifactNaming,
) -> Result<UploadReport, UploadError>
where
    S: ObjectStore + ?Sized,
{
    if !target.staging_dir.is_dir() {
        debug!(staging_dir = %target.staging_dir.display(), "No staging directory, no descriptors");
        return Ok(UploadReport::default());
    }
    let tasks: Vec<UploadTask> = find_descriptors(&target.staging_dir, naming)?
        .iter()
        .map(|path| target.task(path, DESCRIPTOR_CONTENT_TYPE))
        .collect();
    info!(descriptors = tasks.len(), "Uploading deployment descriptors");
    upload_all(store, &tasks, target.concurrency).await
}

/// Upload descriptors, then unit artifacts, then the shared artifact.
pub async fn upload_artifacts<S>(
    store: &S,
    target: &UploadTarget,
    plan: &UploadPlan,
    naming: &dyn ArtifactNaming,
) -> Result<UploadSummary, UploadError>
where
    S: ObjectStore + ?Sized,
{
    let planned = plan.unit_artifacts.iter().chain(plan.service_artifact.iter());
    for artifact in planned {
        if !artifact.path.is_file() {
            error!(
                owner = artifact.owner.id(),
                artifact = %artifact.path.display(),
                "Planned artifact is missing"
            );
            return Err(UploadError::MissingArtifact {
                path: artifact.path.clone(),
            });
        }
    }

    let descriptors = upload_descriptors(store, target, naming).await?;

    info!(artifacts = plan.unit_artifacts.len(), "Uploading unit artifacts");
    let unit_tasks: Vec<UploadTask> = plan
        .unit_artifacts
        .iter()
        .map(|artifact| target.artifact_task(artifact))
        .collect();
    let units = upload_all(store, &unit_tasks, target.concurrency).await?;

    let service = match &plan.service_artifact {
        Some(artifact) => {
            let size = fs::metadata(&artifact.path).map(|m| m.len()).unwrap_or(0);
            info!(
                artifact = %artifact.path.display(),
                bytes = size,
                "Uploading service artifact"
            );
            let task = target.artifact_task(artifact);
            Some(upload_all(store, std::slice::from_ref(&task), 1).await?)
        }
        None => None,
    };

    Ok(UploadSummary {
        descriptors,
        units,
        service,
    })
}
