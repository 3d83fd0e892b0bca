//! Shared utilities for integration testing.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use service_mesh::config::ServiceConfig;
use service_mesh::MeshConfig;

/// A request as seen by the mock backend. Header names are lowercase.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// What the mock backend does with the n-th request.
pub enum Reply {
    Status(u16, String),
    /// Never answer; the connection stays open.
    Hang,
}

#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

/// Start a mock backend that always answers `status` with `body`.
pub async fn start_mock_backend(status: u16, body: &'static str) -> MockBackend {
    start_programmable_backend(move |_, _| Reply::Status(status, body.to_string())).await
}

/// Start a mock backend whose reply depends on the request index (0-based)
/// and the parsed request.
pub async fn start_programmable_backend<F>(f: F) -> MockBackend
where
    F: Fn(usize, &RecordedRequest) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let f = Arc::new(f);

    let shared = backend.clone();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let f = f.clone();
            let shared = shared.clone();
            tokio::spawn(async move {
                handle_connection(socket, shared, f).await;
            });
        }
    });

    backend
}

async fn handle_connection<F>(mut socket: TcpStream, backend: MockBackend, f: Arc<F>)
where
    F: Fn(usize, &RecordedRequest) -> Reply + Send + Sync + 'static,
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    let index = backend.hits.fetch_add(1, Ordering::SeqCst);
    backend.requests.lock().push(request.clone());

    match f(index, &request) {
        Reply::Status(status, body) => {
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                reason(status),
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

    Some(RecordedRequest {
        method,
        path,
        headers,
        body,
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// An address nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// An enabled service definition pointing at `url`.
pub fn service(name: &str, url: &str) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        url: url.to_string(),
        health_path: "/health".to_string(),
        api_key: format!("{}-key", name),
        enabled: true,
        version: "1.0.0".to_string(),
        capabilities: vec!["testing".to_string()],
        timeout_ms: 2_000,
        max_concurrent_requests: 10,
    }
}

/// Config with only `services`, fast deterministic retries and no
/// background health loop.
pub fn test_config(services: Vec<ServiceConfig>) -> MeshConfig {
    let mut config = MeshConfig::default();
    config.services = services;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 5;
    config.retries.jitter_ratio = 0.0;
    config.health_check.enabled = false;
    config.health_check.timeout_ms = 300;
    config
}

/// A client that ignores proxy settings from the environment.
pub fn direct_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
