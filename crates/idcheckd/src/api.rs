//! HTTP-agnostic API layer.
//!
//! Handlers take typed input and return `Result<T, ApiError>`; the server
//! module owns routing and the wire encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use idcheck_core::scoring::VERIFICATION_THRESHOLD;
use idcheck_core::{AttemptRepository, IdentityVerifier, Submission, VerificationAttempt, VerifyError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 200;

/// Error codes that map to HTTP status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    PayloadTooLarge,
    Internal,
}

impl ErrorCode {
    pub const fn status_code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::PayloadTooLarge => 413,
            Self::Internal => 500,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::NotFound,
            message: message.into(),
        }
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self {
            code: ErrorCode::PayloadTooLarge,
            message: format!("request body exceeds {limit} bytes"),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: message.into(),
        }
    }

    pub const fn status_code(&self) -> u16 {
        self.code.status_code()
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorData {
    pub code: String,
    pub message: String,
}

/// Standard API response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorData>,
}

impl<T: Serialize> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(error: &ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiErrorData {
                code: error.code.as_str().to_string(),
                message: error.message.clone(),
            }),
        }
    }
}

/// Body of `POST /api/verify`. Images are base64, optionally as data URLs
/// (`data:image/jpeg;base64,...`) as produced by a browser canvas.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub document: String,
    pub selfie: String,
}

#[derive(Debug, Serialize)]
pub struct AttemptsData {
    pub attempts: Vec<VerificationAttempt>,
}

#[derive(Debug, Serialize)]
pub struct StatusData {
    pub version: &'static str,
    pub threshold: f64,
    pub storage_backend: &'static str,
    pub container: String,
}

/// Shared state handed to every request.
pub struct AppState {
    pub verifier: IdentityVerifier,
    pub storage_backend: &'static str,
    pub container: String,
}

fn decode_image(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    let encoded = match value.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| ApiError::bad_request(format!("{field}: malformed data URL")))?,
        None => value,
    };
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ApiError::bad_request(format!("{field}: invalid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request(format!("{field} is empty")));
    }
    Ok(bytes)
}

/// Verify a document/selfie pair, store both images and record the attempt.
pub async fn verify(state: &AppState, request: &VerifyRequest) -> Result<Submission, ApiError> {
    let document = decode_image("document", &request.document)?;
    let selfie = decode_image("selfie", &request.selfie)?;

    state
        .verifier
        .submit(&document, &selfie)
        .await
        .map_err(|err| match err {
            VerifyError::UnsupportedImage(_) => ApiError::bad_request(err.to_string()),
            other => {
                tracing::error!(error = %other, "verification workflow failed");
                ApiError::internal("could not complete verification; please try again")
            }
        })
}

pub async fn list_attempts(state: &AppState, limit: Option<usize>) -> Result<AttemptsData, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let attempts = state
        .verifier
        .attempts()
        .list_recent(limit)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to list attempts");
            ApiError::internal("could not load attempts")
        })?;
    Ok(AttemptsData { attempts })
}

pub async fn get_attempt(state: &AppState, id: &str) -> Result<VerificationAttempt, ApiError> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid attempt id: {id}")))?;
    state
        .verifier
        .attempts()
        .get(id)
        .await
        .map_err(|e| {
            tracing::error!(id, error = %e, "failed to load attempt");
            ApiError::internal("could not load attempt")
        })?
        .ok_or_else(|| ApiError::not_found(format!("attempt {id} not found")))
}

pub fn status(state: &AppState) -> StatusData {
    StatusData {
        version: env!("CARGO_PKG_VERSION"),
        threshold: VERIFICATION_THRESHOLD,
        storage_backend: state.storage_backend,
        container: state.container.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_base64() {
        assert_eq!(decode_image("document", "aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_data_url() {
        let bytes = decode_image("selfie", "data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_decode_errors() {
        let err = decode_image("document", "***").unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
        assert!(err.message.starts_with("document: invalid base64"));

        assert!(decode_image("selfie", "").is_err());
        assert!(decode_image("selfie", "data:image/png;base64").is_err());
    }

    #[test]
    fn test_error_envelope() {
        let json = serde_json::to_value(ApiResponse::error(&ApiError::not_found("attempt 9 not found"))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "error": {"code": "NOT_FOUND", "message": "attempt 9 not found"}
            })
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::payload_too_large(10).status_code(), 413);
        assert_eq!(ApiError::internal("x").status_code(), 500);
    }
}
