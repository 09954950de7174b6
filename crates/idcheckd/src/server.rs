//! tiny_http front end.
//!
//! The listener blocks on its own thread; every request becomes a tokio
//! task. Body reads and response writes are blocking I/O and run on the
//! blocking pool.

use std::io::{Cursor, Read};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tokio::runtime::Handle;

use crate::api::{self, ApiError, ApiResponse, AppState, VerifyRequest};

/// Encoded response: status code and JSON body.
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        let content_type = Header::from_bytes("Content-Type", "application/json")
            .expect("static header is valid");
        Response::from_data(self.body.into_bytes())
            .with_header(content_type)
            .with_status_code(StatusCode(self.status))
    }
}

/// Serve until Ctrl-C.
pub async fn serve(listen_addr: &str, state: Arc<AppState>, max_body: usize) -> anyhow::Result<()> {
    let server = Server::http(listen_addr)
        .map_err(|e| anyhow::anyhow!("failed to listen on {listen_addr}: {e}"))?;
    let server = Arc::new(server);
    tracing::info!(addr = listen_addr, "http listener ready");

    let accept = {
        let server = server.clone();
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || accept_loop(&server, &handle, &state, max_body))
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down http listener");
    server.unblock();
    accept.await?;
    Ok(())
}

fn accept_loop(server: &Server, handle: &Handle, state: &Arc<AppState>, max_body: usize) {
    for request in server.incoming_requests() {
        let state = state.clone();
        handle.spawn(handle_request(state, request, max_body));
    }
    tracing::debug!("accept loop exited");
}

async fn handle_request(state: Arc<AppState>, mut request: Request, max_body: usize) {
    let method = request.method().clone();
    let url = request.url().to_string();

    let read = tokio::task::spawn_blocking(move || {
        let body = read_body(&mut request, max_body);
        (request, body)
    })
    .await;
    let (request, body) = match read {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(error = %e, "request body reader panicked");
            return;
        }
    };

    let reply = route(&state, &method, &url, body).await;
    tracing::info!(%method, url = %url, status = reply.status, "request handled");

    let response = reply.into_response();
    let sent = tokio::task::spawn_blocking(move || request.respond(response)).await;
    match sent {
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to write response"),
        Err(e) => tracing::error!(error = %e, "response writer panicked"),
        Ok(Ok(())) => {}
    }
}

fn read_body(request: &mut Request, max_body: usize) -> Result<Vec<u8>, ApiError> {
    if request.body_length().is_some_and(|len| len > max_body) {
        return Err(ApiError::payload_too_large(max_body));
    }
    let mut body = Vec::new();
    request
        .as_reader()
        .take(max_body as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| ApiError::bad_request(format!("failed to read request body: {e}")))?;
    if body.len() > max_body {
        return Err(ApiError::payload_too_large(max_body));
    }
    Ok(body)
}

/// Map a request onto an API handler.
pub async fn route(state: &AppState, method: &Method, url: &str, body: Result<Vec<u8>, ApiError>) -> Reply {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));

    match (method, path) {
        (&Method::Post, "/api/verify") => {
            let request = match body.and_then(|b| parse_json::<VerifyRequest>(&b)) {
                Ok(r) => r,
                Err(e) => return error_reply(&e),
            };
            reply(api::verify(state, &request).await)
        }
        (&Method::Get, "/api/status") => reply(Ok(api::status(state))),
        (&Method::Get, "/api/attempts") => match query_limit(query) {
            Ok(limit) => reply(api::list_attempts(state, limit).await),
            Err(e) => error_reply(&e),
        },
        _ if *method == Method::Get && path.starts_with("/api/attempts/") => {
            let id = path.strip_prefix("/api/attempts/").unwrap_or("");
            reply(api::get_attempt(state, id).await)
        }
        _ => error_reply(&ApiError::not_found(format!(
            "API endpoint not found: {method} {path}"
        ))),
    }
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON: {e}")))
}

fn query_limit(query: &str) -> Result<Option<usize>, ApiError> {
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("limit=") {
            return value
                .parse()
                .map(Some)
                .map_err(|_| ApiError::bad_request(format!("invalid limit: {value}")));
        }
    }
    Ok(None)
}

fn reply<T: Serialize>(result: Result<T, ApiError>) -> Reply {
    match result {
        Ok(data) => json_reply(&ApiResponse::success(data), 200),
        Err(e) => error_reply(&e),
    }
}

fn error_reply(error: &ApiError) -> Reply {
    json_reply(&ApiResponse::error(error), error.status_code())
}

fn json_reply<T: Serialize>(data: &T, status: u16) -> Reply {
    let body = serde_json::to_string(data).unwrap_or_else(|_| r#"{"success":false}"#.to_string());
    Reply { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use idcheck_cloud::{BlobImageStore, LocalBlobBackend, SqliteAttemptRepository};
    use idcheck_core::{Detection, IdentityVerifier, VisionAnalyzer, VisionError};
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::TempDir;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    /// Every image contains one person with a fixed confidence.
    struct FixedVision(f64);

    #[async_trait]
    impl VisionAnalyzer for FixedVision {
        async fn detect(&self, _image: &[u8]) -> Result<Detection, VisionError> {
            Ok(Detection::from_confidences(vec![self.0]))
        }
    }

    async fn state(tmp: &TempDir, confidence: f64) -> AppState {
        let images = BlobImageStore::new(LocalBlobBackend::new(tmp.path(), "verification-images"));
        let attempts = SqliteAttemptRepository::open_in_memory().await.unwrap();
        AppState {
            verifier: IdentityVerifier::new(
                Arc::new(FixedVision(confidence)),
                Arc::new(images),
                Arc::new(attempts),
                Duration::from_secs(5),
            ),
            storage_backend: "local",
            container: "verification-images".into(),
        }
    }

    fn verify_body(document: &[u8], selfie: &[u8]) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "document": STANDARD.encode(document),
            "selfie": format!("data:image/jpeg;base64,{}", STANDARD.encode(selfie)),
        }))
        .unwrap()
    }

    fn json(reply: &Reply) -> Value {
        serde_json::from_str(&reply.body).unwrap()
    }

    #[tokio::test]
    async fn test_verify_then_fetch_attempt() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp, 0.9).await;

        let reply = route(&state, &Method::Post, "/api/verify", Ok(verify_body(JPEG, JPEG))).await;
        assert_eq!(reply.status, 200, "{}", reply.body);
        let body = json(&reply);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["result"]["is_verified"], true);
        let id = body["data"]["attempt"]["id"].as_i64().unwrap();
        assert!(id > 0);

        let reply = route(&state, &Method::Get, &format!("/api/attempts/{id}"), Ok(vec![])).await;
        assert_eq!(reply.status, 200);
        assert_eq!(json(&reply)["data"]["confidence_score"], 0.9);

        let stored = std::fs::read_dir(tmp.path().join("verification-images")).unwrap().count();
        assert_eq!(stored, 2);
    }

    #[tokio::test]
    async fn test_low_confidence_is_recorded_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp, 0.3).await;

        let reply = route(&state, &Method::Post, "/api/verify", Ok(verify_body(JPEG, JPEG))).await;
        assert_eq!(reply.status, 200);
        let body = json(&reply);
        assert_eq!(body["data"]["result"]["is_verified"], false);
        assert_eq!(body["data"]["attempt"]["is_verified"], false);
    }

    #[tokio::test]
    async fn test_verify_rejects_non_image() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp, 0.9).await;

        let reply = route(&state, &Method::Post, "/api/verify", Ok(verify_body(b"text", JPEG))).await;
        assert_eq!(reply.status, 400);
        assert_eq!(json(&reply)["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_verify_rejects_bad_json_and_oversize_body() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp, 0.9).await;

        let reply = route(&state, &Method::Post, "/api/verify", Ok(b"{".to_vec())).await;
        assert_eq!(reply.status, 400);

        let reply = route(&state, &Method::Post, "/api/verify", Err(ApiError::payload_too_large(10))).await;
        assert_eq!(reply.status, 413);
    }

    #[tokio::test]
    async fn test_list_attempts_and_limit() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp, 0.9).await;
        for _ in 0..3 {
            route(&state, &Method::Post, "/api/verify", Ok(verify_body(JPEG, JPEG))).await;
        }

        let reply = route(&state, &Method::Get, "/api/attempts?limit=2", Ok(vec![])).await;
        assert_eq!(reply.status, 200);
        let attempts = json(&reply)["data"]["attempts"].as_array().unwrap().len();
        assert_eq!(attempts, 2);

        let reply = route(&state, &Method::Get, "/api/attempts?limit=abc", Ok(vec![])).await;
        assert_eq!(reply.status, 400);
    }

    #[tokio::test]
    async fn test_unknown_attempt_and_route() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp, 0.9).await;

        let reply = route(&state, &Method::Get, "/api/attempts/999", Ok(vec![])).await;
        assert_eq!(reply.status, 404);
        let reply = route(&state, &Method::Get, "/api/attempts/abc", Ok(vec![])).await;
        assert_eq!(reply.status, 400);
        let reply = route(&state, &Method::Delete, "/api/attempts/1", Ok(vec![])).await;
        assert_eq!(reply.status, 404);
    }

    #[tokio::test]
    async fn test_status() {
        let tmp = TempDir::new().unwrap();
        let state = state(&tmp, 0.9).await;

        let reply = route(&state, &Method::Get, "/api/status", Ok(vec![])).await;
        let body = json(&reply);
        assert_eq!(body["data"]["threshold"], 0.7);
        assert_eq!(body["data"]["storage_backend"], "local");
    }

    #[test]
    fn test_query_limit() {
        assert_eq!(query_limit("").unwrap(), None);
        assert_eq!(query_limit("foo=1&limit=5").unwrap(), Some(5));
        assert!(query_limit("limit=-1").is_err());
    }
}
