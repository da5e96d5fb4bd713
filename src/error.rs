//! Error taxonomy for planning, packaging and upload.
//!
//! Planning and packaging errors abort a run before any network activity.
//! Upload errors abort after local artifacts exist, so an upload can be
//! retried without rebuilding.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::upload::UploadReport;

/// Errors raised while turning a project tree into an archive.
#[derive(Debug, Error)]
pub enum PackageError {
    /// A rule could not be compiled into a glob matcher.
    #[error("invalid glob pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// No file survived the include / exclude rules.
    #[error("no file in {} matches the include / exclude patterns", .root.display())]
    EmptySelection { root: PathBuf },

    /// The project tree could not be traversed.
    #[error("failed to read {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The archive could not be written or finalized.
    #[error("failed to write archive {}: {source}", .path.display())]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Errors raised while deciding which artifacts a service needs.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Two distinct artifacts would share a file name, and therefore a staging
    /// path or remote key.
    #[error(
        "artifacts of `{first_owner}` ({}) and `{second_owner}` ({}) share the name `{file_name}`",
        .first.display(),
        .second.display()
    )]
    ArtifactCollision {
        file_name: String,
        first_owner: String,
        first: PathBuf,
        second_owner: String,
        second: PathBuf,
    },
}

/// Errors raised while transferring artifacts to the object store.
#[derive(Debug, Error)]
pub enum UploadError {
    /// A planned artifact is not present on local storage.
    #[error("artifact {} does not exist; package the service before uploading", .path.display())]
    MissingArtifact { path: PathBuf },

    /// The staging directory could not be listed for descriptor files.
    #[error("failed to list staging directory {}: {source}", .path.display())]
    StagingDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// At least one task of a batch failed. The report holds every outcome.
    #[error("upload of `{key}` failed: {reason}")]
    Batch {
        key: String,
        reason: String,
        report: UploadReport,
    },
}

/// Errors raised by the end-to-end deploy pipeline.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}
