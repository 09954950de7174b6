//! Verification orchestration.
//!
//! Runs a detection pass over both images, then a comparison pass that
//! re-analyzes each image and averages the first reported person's confidence
//! from each. Vision
//! faults become failed results; storage and persistence faults propagate.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::naming::{self, ImageKind};
use crate::ports::{AttemptRepository, ImageStore, RepositoryError, StorageError, VisionAnalyzer, VisionError};
use crate::scoring::{self, NO_FACE_MESSAGE, NO_PEOPLE_MESSAGE};
use crate::types::{AttemptError, Detection, NewAttempt, VerificationAttempt, VerificationResult};

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("invalid attempt: {0}")]
    InvalidAttempt(#[from] AttemptError),
    #[error("{0} is not a recognised image")]
    UnsupportedImage(&'static str),
}

/// A completed verification request: the outcome and its stored record.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub result: VerificationResult,
    pub attempt: VerificationAttempt,
}

/// Coordinates the vision analyzer, image store and attempt repository.
#[derive(Clone)]
pub struct IdentityVerifier {
    vision: Arc<dyn VisionAnalyzer>,
    images: Arc<dyn ImageStore>,
    attempts: Arc<dyn AttemptRepository>,
    call_timeout: Duration,
}

impl IdentityVerifier {
    pub fn new(
        vision: Arc<dyn VisionAnalyzer>,
        images: Arc<dyn ImageStore>,
        attempts: Arc<dyn AttemptRepository>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            vision,
            images,
            attempts,
            call_timeout,
        }
    }

    pub fn attempts(&self) -> &Arc<dyn AttemptRepository> {
        &self.attempts
    }

    /// Score a document/selfie pair. Never fails: every problem is reported
    /// through the returned result.
    pub async fn verify_identity(&self, document: &[u8], selfie: &[u8]) -> VerificationResult {
        tracing::info!(
            document_bytes = document.len(),
            selfie_bytes = selfie.len(),
            "starting identity verification"
        );

        match self.score_pair(document, selfie).await {
            Ok(result) => {
                tracing::info!(
                    verified = result.is_verified,
                    score = result.confidence_score,
                    "identity verification finished"
                );
                result
            }
            Err(err) => {
                tracing::error!(error = %err, "error during identity verification");
                VerificationResult::rejected(scoring::fault_message(&err))
            }
        }
    }

    async fn score_pair(&self, document: &[u8], selfie: &[u8]) -> Result<VerificationResult, VisionError> {
        let (doc_face, selfie_face) = self.detect_both(document, selfie).await?;
        if !doc_face.is_detected() || !selfie_face.is_detected() {
            tracing::warn!(
                document = doc_face.is_detected(),
                selfie = selfie_face.is_detected(),
                "face missing in detection pass"
            );
            return Ok(VerificationResult::rejected(NO_FACE_MESSAGE));
        }

        let (doc_people, selfie_people) = self.detect_both(document, selfie).await?;
        let (Some(c1), Some(c2)) = (doc_people.first_confidence(), selfie_people.first_confidence()) else {
            tracing::warn!("one or both images do not contain detectable people");
            return Ok(VerificationResult::rejected(NO_PEOPLE_MESSAGE));
        };

        let score = scoring::combined_score(c1, c2);
        tracing::info!(document = c1, selfie = c2, score, "comparison confidence");
        Ok(scoring::evaluate(score, Utc::now()))
    }

    /// Analyze both images concurrently. The document result always comes first.
    async fn detect_both(&self, document: &[u8], selfie: &[u8]) -> Result<(Detection, Detection), VisionError> {
        let secs = self.call_timeout.as_secs();
        let (doc, selfie) = tokio::join!(
            bounded(self.call_timeout, self.vision.detect(document), || VisionError::Timeout(secs)),
            bounded(self.call_timeout, self.vision.detect(selfie), || VisionError::Timeout(secs)),
        );
        Ok((doc?, selfie?))
    }

    /// Upload one image and return its storage reference.
    pub async fn save_image(&self, bytes: &[u8], file_name: &str) -> Result<String, VerifyError> {
        let content_type = naming::content_type(naming::sniff_format(bytes));
        let secs = self.call_timeout.as_secs();
        let reference = bounded(
            self.call_timeout,
            self.images.put(bytes, file_name, content_type),
            || StorageError::Timeout(secs),
        )
        .await
        .map_err(|err| {
            tracing::error!(file_name, error = %err, "error saving image");
            err
        })?;

        tracing::info!(file_name, "image saved");
        Ok(reference)
    }

    /// Persist the outcome of a verification together with its image references.
    pub async fn save_verification_attempt(
        &self,
        result: &VerificationResult,
        document_path: &str,
        selfie_path: &str,
    ) -> Result<VerificationAttempt, VerifyError> {
        let attempt = NewAttempt::new(result, document_path, selfie_path)?;
        let secs = self.call_timeout.as_secs();
        let stored = bounded(self.call_timeout, self.attempts.create(attempt), || {
            RepositoryError::Timeout(secs)
        })
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "error saving verification attempt");
            err
        })?;

        tracing::info!(id = stored.id, "verification attempt saved");
        Ok(stored)
    }

    /// Full request workflow: verify, upload both images, record the attempt.
    pub async fn submit(&self, document: &[u8], selfie: &[u8]) -> Result<Submission, VerifyError> {
        let doc_format = naming::sniff_format(document).ok_or(VerifyError::UnsupportedImage("document"))?;
        let selfie_format = naming::sniff_format(selfie).ok_or(VerifyError::UnsupportedImage("selfie"))?;

        let result = self.verify_identity(document, selfie).await;

        let now = Utc::now();
        let doc_key = naming::storage_key(ImageKind::Document, Some(doc_format), now);
        let selfie_key = naming::storage_key(ImageKind::Selfie, Some(selfie_format), now);

        let document_path = self.save_image(document, &doc_key).await?;
        let selfie_path = self.save_image(selfie, &selfie_key).await?;

        let attempt = self
            .save_verification_attempt(&result, &document_path, &selfie_path)
            .await?;

        Ok(Submission { result, attempt })
    }
}

/// Await `fut`, failing with `on_timeout()` once `limit` elapses.
async fn bounded<T, E, F>(limit: Duration, fut: F, on_timeout: impl FnOnce() -> E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(on_timeout()),
    }
}
