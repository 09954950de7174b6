//! idcheck-cloud — Adapters for the services behind the verification flow.
//!
//! Provides the HTTP vision analyzer, blob-backed image stores with a
//! one-time container provisioning gate, and the SQLite attempt repository.

pub mod azure_blob;
pub mod blob;
pub mod local_blob;
pub mod sqlite;
pub mod vision;

#[cfg(test)]
mod test_http;

pub use azure_blob::{AzureBlobBackend, BlobConnection};
pub use blob::{BlobBackend, BlobImageStore};
pub use local_blob::LocalBlobBackend;
pub use sqlite::SqliteAttemptRepository;
pub use vision::AzureVisionAnalyzer;
