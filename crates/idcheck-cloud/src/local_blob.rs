//! Filesystem blob backend for development and single-host deployments.
//! The container is a directory under the root; blobs are files in it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use idcheck_core::types::MAX_PATH_LEN;
use idcheck_core::StorageError;
use uuid::Uuid;

use crate::blob::BlobBackend;

pub struct LocalBlobBackend {
    container: String,
    dir: PathBuf,
}

impl LocalBlobBackend {
    pub fn new(root: impl AsRef<Path>, container: &str) -> Self {
        Self {
            container: container.to_string(),
            dir: root.as_ref().join(container),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[async_trait]
impl BlobBackend for LocalBlobBackend {
    fn container(&self) -> &str {
        &self.container
    }

    async fn create_container_if_missing(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::Provision {
                container: self.container.clone(),
                reason: format!("{}: {e}", self.dir.display()),
            })
    }

    async fn put_blob(&self, name: &str, bytes: &[u8], _content_type: &str) -> Result<String, StorageError> {
        let dir = tokio::fs::canonicalize(&self.dir).await?;
        let path = dir.join(name);
        let reference = path.to_string_lossy().into_owned();
        let len = reference.chars().count();
        if len > MAX_PATH_LEN {
            return Err(StorageError::InvalidName(format!(
                "{name}: stored path is {len} characters, limit is {MAX_PATH_LEN}"
            )));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Per-write temp file, then rename: readers never see a partial image
        // and concurrent writers of one name each land whole.
        let tmp = dir.join(format!("{name}.{}.partial", Uuid::new_v4().simple()));
        let written = match tokio::fs::write(&tmp, bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(reference)
    }

    async fn get_blob(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(self.blob_path(name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_blob(&self, name: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.blob_path(name)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
