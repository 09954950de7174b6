//! idcheck-core — Identity verification orchestration.
//!
//! Face detection is delegated to an external vision service; this crate
//! combines the two detection confidences into a score, applies the pass
//! threshold, and coordinates storing the images and the attempt record.

pub mod naming;
pub mod ports;
pub mod scoring;
pub mod types;
pub mod verifier;

pub use ports::{AttemptRepository, ImageStore, RepositoryError, StorageError, VisionAnalyzer, VisionError};
pub use types::{AttemptError, Detection, NewAttempt, VerificationAttempt, VerificationResult};
pub use verifier::{IdentityVerifier, Submission, VerifyError};
