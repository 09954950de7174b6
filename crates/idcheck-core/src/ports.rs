//! Contracts for the external collaborators: the vision service, the image
//! store and the attempt repository.

use crate::types::{AttemptError, Detection, NewAttempt, VerificationAttempt};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("vision request failed: {0}")]
    Transport(String),
    #[error("vision service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed vision response: {0}")]
    Malformed(String),
    #[error("vision call timed out after {0}s")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to provision container {container}: {reason}")]
    Provision { container: String, reason: String },
    #[error("storage request failed: {0}")]
    Transport(String),
    #[error("storage service returned {status} for {name}: {body}")]
    Status { name: String, status: u16, body: String },
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("invalid image name: {0}")]
    InvalidName(String),
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage misconfigured: {0}")]
    Config(String),
    #[error("storage call timed out after {0}s")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(String),
    #[error("invalid attempt: {0}")]
    Invalid(#[from] AttemptError),
    #[error("repository call timed out after {0}s")]
    Timeout(u64),
}

/// Face/person detection on a single image.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// Analyze one image. Service or transport faults are errors, never
    /// [`Detection::NotDetected`].
    async fn detect(&self, image: &[u8]) -> Result<Detection, VisionError>;
}

/// Durable name-addressed blob storage for submitted images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `bytes` under `name`, replacing any existing object.
    /// Returns an opaque reference (URL or path) to the stored object.
    async fn put(&self, bytes: &[u8], name: &str, content_type: &str) -> Result<String, StorageError>;

    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove `name`. Succeeds when the object does not exist.
    async fn delete(&self, name: &str) -> Result<(), StorageError>;
}

/// Durable record store for verification attempts.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Persist a new attempt and return it with its assigned id.
    async fn create(&self, attempt: NewAttempt) -> Result<VerificationAttempt, RepositoryError>;

    async fn get(&self, id: i64) -> Result<Option<VerificationAttempt>, RepositoryError>;

    /// Most recent attempts first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<VerificationAttempt>, RepositoryError>;
}
