//! Loopback HTTP server that answers with canned responses, in order.

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tiny_http::{Header, Response, Server};

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Seen {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct CannedServer {
    pub base: String,
    seen: Arc<Mutex<Vec<Seen>>>,
    worker: Option<JoinHandle<()>>,
}

impl CannedServer {
    /// Serve `responses` (status, body) one per request, then stop.
    pub fn start(responses: Vec<(u16, &'static str)>) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        let worker = std::thread::spawn(move || {
            for (status, body) in responses {
                let Ok(mut request) = server.recv() else { return };
                let mut buf = Vec::new();
                let _ = request.as_reader().read_to_end(&mut buf);
                log.lock().unwrap().push(Seen {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    headers: request
                        .headers()
                        .iter()
                        .map(|h| (h.field.to_string(), h.value.to_string()))
                        .collect(),
                    body: buf,
                });
                let content_type = Header::from_bytes("Content-Type", "application/json").unwrap();
                let _ = request.respond(
                    Response::from_string(body)
                        .with_status_code(status)
                        .with_header(content_type),
                );
            }
        });

        Self {
            base: format!("http://{addr}"),
            seen,
            worker: Some(worker),
        }
    }

    /// Requests received so far, waiting for the canned responses to drain.
    pub fn finish(mut self) -> Vec<Seen> {
        if let Some(worker) = self.worker.take() {
            worker.join().unwrap();
        }
        let seen = self.seen.lock().unwrap().clone();
        seen
    }
}
