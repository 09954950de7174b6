//! Image store over a container-based blob backend.
//!
//! The container is provisioned lazily on first use. A `OnceCell` gates the
//! check-and-create so concurrent first callers provision it once; a failed
//! attempt leaves the cell empty and the next caller tries again.

use async_trait::async_trait;
use idcheck_core::types::MAX_PATH_LEN;
use idcheck_core::{ImageStore, StorageError};
use tokio::sync::OnceCell;

/// Raw operations against a blob service, scoped to one container.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    fn container(&self) -> &str;

    /// Create the container unless it already exists.
    async fn create_container_if_missing(&self) -> Result<(), StorageError>;

    /// Upload, overwriting any existing blob. Returns the blob reference.
    async fn put_blob(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<String, StorageError>;

    async fn get_blob(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Delete a blob; a missing blob is not an error.
    async fn delete_blob(&self, name: &str) -> Result<(), StorageError>;
}

/// [`ImageStore`] that provisions its container exactly once.
pub struct BlobImageStore<B> {
    backend: B,
    provisioned: OnceCell<()>,
}

impl<B: BlobBackend> BlobImageStore<B> {
    pub fn new(backend: B) -> Self {
        tracing::info!(
            container = backend.container(),
            "image store initialized (container will be ensured on first use)"
        );
        Self {
            backend,
            provisioned: OnceCell::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn ensure_container(&self) -> Result<(), StorageError> {
        self.provisioned
            .get_or_try_init(|| async {
                let container = self.backend.container();
                match self.backend.create_container_if_missing().await {
                    Ok(()) => {
                        tracing::info!(container, "container is ready");
                        Ok(())
                    }
                    Err(err) => {
                        tracing::error!(container, error = %err, "error ensuring container exists");
                        Err(err)
                    }
                }
            })
            .await
            .map(|_| ())
    }
}

/// Blob names are flat keys: no traversal, no absolute paths.
fn check_name(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name.len() > MAX_PATH_LEN
        || name.starts_with('/')
        || name.contains('\\')
        || name.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl<B: BlobBackend> ImageStore for BlobImageStore<B> {
    async fn put(&self, bytes: &[u8], name: &str, content_type: &str) -> Result<String, StorageError> {
        check_name(name)?;
        self.ensure_container().await?;

        let reference = self
            .backend
            .put_blob(name, bytes, content_type)
            .await
            .map_err(|err| {
                tracing::error!(name, error = %err, "error uploading image");
                err
            })?;
        tracing::info!(name, bytes = bytes.len(), "uploaded image");
        Ok(reference)
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        check_name(name)?;
        self.ensure_container().await?;

        let bytes = self.backend.get_blob(name).await.map_err(|err| {
            tracing::error!(name, error = %err, "error downloading image");
            err
        })?;
        tracing::info!(name, bytes = bytes.len(), "downloaded image");
        Ok(bytes)
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        check_name(name)?;
        self.backend.delete_blob(name).await.map_err(|err| {
            tracing::error!(name, error = %err, "error deleting image");
            err
        })?;
        tracing::info!(name, "deleted image");
        Ok(())
    }
}
