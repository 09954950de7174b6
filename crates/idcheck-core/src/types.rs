use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length, in characters, of a stored image reference.
pub const MAX_PATH_LEN: usize = 500;

/// Outcome of one vision analysis of one image.
///
/// Transport and service faults are not represented here; they surface as
/// `Err(VisionError)` from the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detection {
    /// At least one person was found. Holds one confidence per person.
    Detected { confidences: Vec<f64> },
    NotDetected,
}

impl Detection {
    /// Build a detection from the per-person confidences reported by the service.
    /// An empty list means nobody was found.
    pub fn from_confidences(confidences: Vec<f64>) -> Self {
        if confidences.is_empty() {
            Detection::NotDetected
        } else {
            Detection::Detected { confidences }
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, Detection::Detected { .. })
    }

    /// Confidence of the first person the service reported, or `None` when
    /// nothing was detected. The service's ordering is kept as-is.
    pub fn first_confidence(&self) -> Option<f64> {
        match self {
            Detection::Detected { confidences } => confidences.first().copied(),
            Detection::NotDetected => None,
        }
    }

    /// Number of people detected.
    pub fn people(&self) -> usize {
        match self {
            Detection::Detected { confidences } => confidences.len(),
            Detection::NotDetected => 0,
        }
    }
}

/// Outcome of a verification request. Not persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_verified: bool,
    /// Combined detection confidence in [0, 1].
    pub confidence_score: f64,
    pub message: String,
    pub attempt_date: DateTime<Utc>,
}

impl VerificationResult {
    /// A failed result with a zero score, stamped now.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_verified: false,
            confidence_score: 0.0,
            message: message.into(),
            attempt_date: Utc::now(),
        }
    }
}

/// A persisted verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationAttempt {
    /// Assigned by the repository on creation.
    pub id: i64,
    pub document_path: String,
    pub selfie_path: String,
    pub is_verified: bool,
    pub confidence_score: f64,
    pub attempt_date: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    #[error("{field} must not be empty")]
    EmptyPath { field: &'static str },
    #[error("{field} is {len} characters, limit is {limit}", limit = MAX_PATH_LEN)]
    PathTooLong { field: &'static str, len: usize },
    #[error("confidence score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),
}

/// A validated attempt that has not been assigned an id yet.
///
/// Fields are private so every instance has passed [`NewAttempt::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttempt {
    document_path: String,
    selfie_path: String,
    is_verified: bool,
    confidence_score: f64,
    attempt_date: DateTime<Utc>,
}

impl NewAttempt {
    /// Copy the outcome fields from `result` and attach the two image references.
    pub fn new(
        result: &VerificationResult,
        document_path: impl Into<String>,
        selfie_path: impl Into<String>,
    ) -> Result<Self, AttemptError> {
        let document_path = document_path.into();
        let selfie_path = selfie_path.into();
        check_path("document_path", &document_path)?;
        check_path("selfie_path", &selfie_path)?;

        let score = result.confidence_score;
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(AttemptError::ScoreOutOfRange(score));
        }

        Ok(Self {
            document_path,
            selfie_path,
            is_verified: result.is_verified,
            confidence_score: score,
            attempt_date: result.attempt_date,
        })
    }

    pub fn document_path(&self) -> &str {
        &self.document_path
    }

    pub fn selfie_path(&self) -> &str {
        &self.selfie_path
    }

    pub fn is_verified(&self) -> bool {
        self.is_verified
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn attempt_date(&self) -> DateTime<Utc> {
        self.attempt_date
    }

    /// Attach the id issued by the repository.
    pub fn with_id(self, id: i64) -> VerificationAttempt {
        VerificationAttempt {
            id,
            document_path: self.document_path,
            selfie_path: self.selfie_path,
            is_verified: self.is_verified,
            confidence_score: self.confidence_score,
            attempt_date: self.attempt_date,
        }
    }
}

fn check_path(field: &'static str, value: &str) -> Result<(), AttemptError> {
    if value.trim().is_empty() {
        return Err(AttemptError::EmptyPath { field });
    }
    let len = value.chars().count();
    if len > MAX_PATH_LEN {
        return Err(AttemptError::PathTooLong { field, len });
    }
    Ok(())
}
