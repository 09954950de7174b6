//! Confidence scoring and pass/fail evaluation.
//!
//! The score is the mean of the two images' top detection confidences.
//! It says nothing about whether the two faces belong to the same person.

use crate::types::VerificationResult;
use chrono::{DateTime, Utc};

/// Minimum combined confidence for a successful verification.
pub const VERIFICATION_THRESHOLD: f64 = 0.70;

pub const NO_FACE_MESSAGE: &str = "Could not detect face in one or both images";
pub const NO_PEOPLE_MESSAGE: &str = "One or both images do not contain detectable people";

/// Mean of two detection confidences, clamped to [0, 1].
/// Non-finite input scores 0.0.
pub fn combined_score(document: f64, selfie: f64) -> f64 {
    let score = (document + selfie) / 2.0;
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn is_verified(score: f64) -> bool {
    score >= VERIFICATION_THRESHOLD
}

/// Render a fraction as a percentage with two decimals, e.g. `0.7` → `70.00%`.
pub fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

pub fn outcome_message(score: f64, verified: bool) -> String {
    if verified {
        format!(
            "Identity verified successfully with {} confidence",
            percent(score)
        )
    } else {
        format!(
            "Identity verification failed. Confidence score {} is below threshold of {}",
            percent(score),
            percent(VERIFICATION_THRESHOLD)
        )
    }
}

pub fn fault_message(error: &dyn std::fmt::Display) -> String {
    format!("Verification failed due to error: {error}")
}

/// Apply the threshold to a combined score and build the result.
pub fn evaluate(score: f64, now: DateTime<Utc>) -> VerificationResult {
    let verified = is_verified(score);
    VerificationResult {
        is_verified: verified,
        confidence_score: score,
        message: outcome_message(score, verified),
        attempt_date: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary() {
        assert!(is_verified(0.70));
        assert!(!is_verified(0.699999));
        assert!(is_verified(1.0));
        assert!(!is_verified(0.0));
    }

    #[test]
    fn test_combined_score_is_mean() {
        assert_eq!(combined_score(0.9, 0.5), (0.9 + 0.5) / 2.0);
        assert_eq!(combined_score(0.4, 0.6), 0.5);
    }

    #[test]
    fn test_mean_of_point_nine_and_point_five_passes() {
        let score = combined_score(0.9, 0.5);
        assert!((score - 0.7).abs() < 1e-12);
        assert!(is_verified(score));
    }

    #[test]
    fn test_combined_score_stays_in_unit_range() {
        assert_eq!(combined_score(1.4, 1.0), 1.0);
        assert_eq!(combined_score(-0.5, 0.1), 0.0);
        assert_eq!(combined_score(f64::NAN, 0.9), 0.0);
        assert_eq!(combined_score(f64::INFINITY, 0.9), 0.0);
    }

    #[test]
    fn test_evaluate_pass_message() {
        let now = Utc::now();
        let r = evaluate(0.85, now);
        assert!(r.is_verified);
        assert_eq!(r.attempt_date, now);
        assert_eq!(r.message, "Identity verified successfully with 85.00% confidence");
    }

    #[test]
    fn test_evaluate_fail_message() {
        let r = evaluate(0.5, Utc::now());
        assert!(!r.is_verified);
        assert_eq!(r.confidence_score, 0.5);
        assert_eq!(
            r.message,
            "Identity verification failed. Confidence score 50.00% is below threshold of 70.00%"
        );
    }

    #[test]
    fn test_fault_message_embeds_error() {
        assert_eq!(
            fault_message(&"connection reset"),
            "Verification failed due to error: connection reset"
        );
    }
}
