//! # store: remote artifact store interface
//!
//! This module defines the single transport operation the upload
//! orchestrator needs (`put`) and a filesystem-backed implementation.
//!
//! ## Interface & Extensibility
//! - Implement [`ObjectStore`] for a new destination (HTTP endpoint, cloud SDK, mock).
//! - `put` is treated as atomic: it either stores the whole object or fails.
//! - Request signing, retries and timeouts belong to the implementation.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; tests use `MockObjectStore`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use tracing::debug;

/// Boxed error returned by store implementations.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// One object to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObject {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    /// Full object content, owned by this request.
    pub body: Vec<u8>,
}

/// Remote object store receiving artifacts and descriptors.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `request.body` under `request.bucket` / `request.key`.
    async fn put(&self, request: PutObject) -> Result<(), StoreError>;
}

/// Stores objects as files under `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an object would be written to.
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.join(bucket), |path, segment| path.join(segment))
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn put(&self, request: PutObject) -> Result<(), StoreError> {
        if request.key.split('/').any(|segment| segment == "..") {
            return Err(format!("object key `{}` escapes the bucket", request.key).into());
        }
        let path = self.object_path(&request.bucket, &request.key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &request.body).await?;
        debug!(
            path = %path.display(),
            content_type = %request.content_type,
            bytes = request.body.len(),
            "Stored object on local disk"
        );
        Ok(())
    }
}
