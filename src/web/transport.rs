//! HTTP transport seam and the default `ureq`-backed implementation

use crate::config::DEFAULT_MAX_RESPONSE_BYTES;
use crate::error::TransportError;
use crate::web::request::Method;
use std::collections::HashMap;
use std::time::Duration;

/// A fully encoded request as handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub method: Method,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Response body; bytes that are not valid UTF-8 are replaced with U+FFFD
    pub body: String,
}

/// Performs a single HTTP exchange.
///
/// Called from a worker's background thread, so implementations may block.
/// Any HTTP status (including 4xx/5xx) is a successful exchange; only
/// failures to obtain a response are errors.
pub trait Transport: Send + Sync {
    fn perform(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Default transport backed by a shared `ureq` agent.
pub struct HttpTransport {
    agent: ureq::Agent,
    body_limit: u64,
}

impl HttpTransport {
    pub fn new(timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();
        Self {
            agent: config.into(),
            body_limit: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    /// Largest body read from a response. Longer bodies fail the request.
    pub fn body_limit(mut self, limit: u64) -> Self {
        self.body_limit = limit;
        self
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Transport for HttpTransport {
    fn perform(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let result = match request.method {
            Method::Get => {
                let mut builder = self.agent.get(request.uri.as_str());
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            Method::Post => {
                let mut builder = self.agent.post(request.uri.as_str());
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.send(request.body.as_slice())
            }
        };

        let mut response = result.map_err(map_ureq_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response
            .body_mut()
            .with_config()
            .limit(self.body_limit)
            .read_to_vec()
            .map_err(map_ureq_error)?;

        Ok(TransportResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

fn map_ureq_error(error: ureq::Error) -> TransportError {
    match error {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::Io(e) => TransportError::Io(e.to_string()),
        ureq::Error::BodyExceedsLimit(limit) => {
            TransportError::Protocol(format!("response body exceeds {} bytes", limit))
        }
        other => TransportError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Serves one canned response on loopback and returns the raw request.
    fn serve_once(status_line: &str, body: &[u8]) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}/resource", listener.local_addr().unwrap());
        let status_line = status_line.to_string();
        let body = body.to_vec();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&raw[..end]).to_ascii_lowercase();
                    let length = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            let head = format!(
                "{}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                body.len()
            );
            // The client may hang up early when it rejects the body.
            let _ = stream
                .write_all(head.as_bytes())
                .and_then(|_| stream.write_all(&body))
                .and_then(|_| stream.flush());
            String::from_utf8_lossy(&raw).into_owned()
        });

        (uri, handle)
    }

    fn get(uri: &str) -> TransportRequest {
        TransportRequest {
            method: Method::Get,
            uri: uri.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(Some(Duration::from_secs(5)))
    }

    #[test]
    fn error_status_is_a_response() {
        let (uri, server) = serve_once("HTTP/1.1 404 Not Found", b"missing");

        let response = transport().perform(&get(&uri)).unwrap();
        server.join().unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.body, "missing");
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("application/octet-stream")
        );
    }

    #[test]
    fn binary_body_is_delivered_lossily() {
        let payload = [0xffu8, 0xd8, 0xff, 0xe0];
        let (uri, server) = serve_once("HTTP/1.1 200 OK", &payload);

        let response = transport().perform(&get(&uri)).unwrap();
        server.join().unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, String::from_utf8_lossy(&payload));
    }

    #[test]
    fn request_headers_and_body_reach_server() {
        let (uri, server) = serve_once("HTTP/1.1 201 Created", b"");
        let request = TransportRequest {
            method: Method::Post,
            uri,
            headers: vec![
                ("Cookie".to_string(), "sid=7".to_string()),
                ("Content-Type".to_string(), "text/plain".to_string()),
            ],
            body: b"ping".to_vec(),
        };

        let response = transport().perform(&request).unwrap();
        let raw = server.join().unwrap();
        let lowered = raw.to_ascii_lowercase();

        assert_eq!(response.status, 201);
        assert!(raw.starts_with("POST /resource"));
        assert!(lowered.contains("cookie: sid=7\r\n"));
        assert!(lowered.contains("content-type: text/plain\r\n"));
        assert!(raw.ends_with("\r\n\r\nping"));
    }

    #[test]
    fn oversized_body_is_rejected() {
        let (uri, server) = serve_once("HTTP/1.1 200 OK", &[b'x'; 64]);

        let result = transport().body_limit(16).perform(&get(&uri));
        server.join().unwrap();

        assert!(result.is_err());
    }

    #[test]
    fn refused_connection_is_an_error() {
        let uri = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}/", listener.local_addr().unwrap())
        };

        assert!(transport().perform(&get(&uri)).is_err());
    }
}
