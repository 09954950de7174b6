//! Azure AI Vision image analysis client.
//!
//! Calls the Image Analysis 4.0 REST endpoint with the `people` feature and
//! maps the detected people's confidences onto a [`Detection`].

use std::time::Duration;

use async_trait::async_trait;
use idcheck_core::{Detection, VisionAnalyzer, VisionError};
use serde::Deserialize;

const ANALYZE_PATH: &str = "computervision/imageanalysis:analyze";
const API_VERSION: &str = "2024-02-01";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    people_result: Option<PeopleResult>,
}

#[derive(Debug, Deserialize)]
struct PeopleResult {
    values: Vec<DetectedPerson>,
}

#[derive(Debug, Deserialize)]
struct DetectedPerson {
    confidence: f64,
}

/// Vision analyzer backed by an Azure AI Vision resource.
pub struct AzureVisionAnalyzer {
    client: reqwest::Client,
    analyze_url: String,
    key: String,
}

impl AzureVisionAnalyzer {
    pub fn new(endpoint: &str, key: &str, timeout: Duration) -> Result<Self, VisionError> {
        if endpoint.trim().is_empty() {
            return Err(VisionError::Transport("vision endpoint not configured".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VisionError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            analyze_url: analyze_url(endpoint),
            key: key.to_string(),
        })
    }
}

fn analyze_url(endpoint: &str) -> String {
    format!(
        "{}/{ANALYZE_PATH}?api-version={API_VERSION}&features=people&gender-neutral-caption=true",
        endpoint.trim_end_matches('/')
    )
}

/// Extract per-person confidences from an analysis response body.
fn parse_people(body: &str) -> Result<Detection, VisionError> {
    let response: AnalyzeResponse =
        serde_json::from_str(body).map_err(|e| VisionError::Malformed(e.to_string()))?;
    let people = response
        .people_result
        .ok_or_else(|| VisionError::Malformed("response has no peopleResult".into()))?;
    Ok(Detection::from_confidences(
        people.values.into_iter().map(|p| p.confidence).collect(),
    ))
}

#[async_trait]
impl VisionAnalyzer for AzureVisionAnalyzer {
    async fn detect(&self, image: &[u8]) -> Result<Detection, VisionError> {
        let response = self
            .client
            .post(&self.analyze_url)
            .header(KEY_HEADER, &self.key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "vision request failed");
                VisionError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VisionError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "vision service rejected request");
            return Err(VisionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let detection = parse_people(&body)?;
        if detection.is_detected() {
            tracing::info!(people = detection.people(), "detected person(s) in image");
        } else {
            tracing::warn!("no faces detected in image");
        }
        Ok(detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_http::CannedServer;

    #[test]
    fn test_analyze_url_trims_slash() {
        assert_eq!(
            analyze_url("https://example.cognitiveservices.azure.com/"),
            "https://example.cognitiveservices.azure.com/computervision/imageanalysis:analyze\
             ?api-version=2024-02-01&features=people&gender-neutral-caption=true"
        );
    }

    #[test]
    fn test_parse_people_confidences() {
        let body = r#"{
            "modelVersion": "2023-10-01",
            "metadata": {"width": 640, "height": 480},
            "peopleResult": {"values": [
                {"boundingBox": {"x": 1, "y": 2, "w": 30, "h": 40}, "confidence": 0.93},
                {"boundingBox": {"x": 5, "y": 6, "w": 7, "h": 8}, "confidence": 0.12}
            ]}
        }"#;
        let detection = parse_people(body).unwrap();
        assert_eq!(detection, Detection::Detected { confidences: vec![0.93, 0.12] });
        assert_eq!(detection.first_confidence(), Some(0.93));
    }

    #[test]
    fn test_parse_empty_people_is_not_detected() {
        let body = r#"{"peopleResult": {"values": []}}"#;
        assert_eq!(parse_people(body).unwrap(), Detection::NotDetected);
    }

    #[test]
    fn test_parse_missing_people_is_malformed() {
        let err = parse_people(r#"{"modelVersion": "x"}"#).unwrap_err();
        assert!(matches!(err, VisionError::Malformed(_)));
        assert!(matches!(parse_people("<html>"), Err(VisionError::Malformed(_))));
    }

    #[test]
    fn test_new_rejects_blank_endpoint() {
        assert!(AzureVisionAnalyzer::new("  ", "key", Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn test_detect_posts_image_with_key() {
        let server = CannedServer::start(vec![(
            200,
            r#"{"peopleResult": {"values": [{"confidence": 0.88}]}}"#,
        )]);
        let analyzer = AzureVisionAnalyzer::new(&server.base, "sub-key", Duration::from_secs(5)).unwrap();

        let detection = analyzer.detect(b"jpeg bytes").await.unwrap();
        assert_eq!(detection, Detection::Detected { confidences: vec![0.88] });

        let seen = server.finish();
        assert_eq!(seen[0].method, "POST");
        assert!(seen[0].url.starts_with("/computervision/imageanalysis:analyze?"));
        assert!(seen[0].url.contains("features=people"));
        assert_eq!(seen[0].header(KEY_HEADER), Some("sub-key"));
        assert_eq!(seen[0].body, b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_detect_non_success_is_status_error() {
        let server = CannedServer::start(vec![
            (401, r#"{"error": {"code": "401", "message": "Access denied"}}"#),
            (200, r#"{"modelVersion": "2023-10-01"}"#),
        ]);
        let analyzer = AzureVisionAnalyzer::new(&server.base, "bad-key", Duration::from_secs(5)).unwrap();

        match analyzer.detect(b"img").await {
            Err(VisionError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("Access denied"), "{body}");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert!(matches!(analyzer.detect(b"img").await, Err(VisionError::Malformed(_))));
        server.finish();
    }
}
