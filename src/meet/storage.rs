//! Durable storage for finished recordings. The backend is an external
//! collaborator behind a trait; the local-disk implementation serves
//! single-host deployments and tests, with S3-style backends slotting in
//! behind the same seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::shared::error::MeetError;

#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Copies the artifact at `local_path` into durable storage under
    /// `key` and returns its storage URL.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, MeetError>;
    async fn delete(&self, key: &str) -> Result<(), MeetError>;
}

pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StorageProvider for LocalDiskStorage {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, MeetError> {
        let dest = self.root.join(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MeetError::Storage(format!("creating {}: {e}", parent.display())))?;
        }
        tokio::fs::copy(local_path, &dest).await.map_err(|e| {
            MeetError::Storage(format!(
                "copying {} to {}: {e}",
                local_path.display(),
                dest.display()
            ))
        })?;
        Ok(format!("file://{}", dest.display()))
    }

    async fn delete(&self, key: &str) -> Result<(), MeetError> {
        let dest = self.root.join(key);
        match tokio::fs::remove_file(&dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MeetError::Storage(format!(
                "deleting {}: {e}",
                dest.display()
            ))),
        }
    }
}
