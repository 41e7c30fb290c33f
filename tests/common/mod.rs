//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use edge_rewrite_proxy::cache::{CacheEntry, CacheKey, CacheStorage, MemoryStorage, StorageError};
use edge_rewrite_proxy::upstream::{OriginTransport, OutboundRequest, UpstreamBody, UpstreamResponse};
use edge_rewrite_proxy::{HttpServer, ProxyConfig, ProxyError};

/// Config used across the pipeline tests.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.origin.base_url = "https://ceshi.example.org".into();
    config.rewrite.from_domain = "ceshi.example.org".into();
    config.rewrite.to_domain = "target.example.net".into();
    config.cache.ttl_secs = 3600;
    config.timeouts.connect_secs = 2;
    config
}

/// What the transport double saw.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

enum Reply {
    Respond {
        status: StatusCode,
        headers: Vec<(HeaderName, HeaderValue)>,
        body: Bytes,
    },
    Fail(String),
}

/// Call-counting `OriginTransport` double with a canned reply.
pub struct CountingTransport {
    calls: AtomicUsize,
    reply: Reply,
    delay: Option<Duration>,
    last: Mutex<Option<CapturedRequest>>,
}

impl CountingTransport {
    pub fn respond(status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        let headers = vec![(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap())];
        Self::respond_with(status, headers, body)
    }

    pub fn respond_with(
        status: u16,
        headers: Vec<(HeaderName, HeaderValue)>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self::new(Reply::Respond {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body: body.into(),
        })
    }

    pub fn fail(reason: &str) -> Self {
        Self::new(Reply::Fail(reason.to_string()))
    }

    fn new(reply: Reply) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply,
            delay: None,
            last: Mutex::new(None),
        }
    }

    /// Wait this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CapturedRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl OriginTransport for CountingTransport {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let body = match request.body {
            Some(body) => Some(
                axum::body::to_bytes(body, usize::MAX)
                    .await
                    .map_err(|e| ProxyError::Body(e.to_string()))?,
            ),
            None => None,
        };
        *self.last.lock().unwrap() = Some(CapturedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.reply {
            Reply::Respond { status, headers, body } => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    map.append(name.clone(), value.clone());
                }
                map.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
                Ok(UpstreamResponse {
                    status: *status,
                    headers: map,
                    body: UpstreamBody::Streaming(Body::from(body.clone())),
                })
            }
            Reply::Fail(reason) => Err(ProxyError::OriginConnection(reason.clone())),
        }
    }
}

/// `CacheStorage` wrapper that counts every access.
#[derive(Default)]
pub struct CountingStorage {
    pub inner: MemoryStorage,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl CountingStorage {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStorage for CountingStorage {
    async fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: CacheKey, entry: Arc<CacheEntry>) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, entry).await
    }
}

/// Server wired to the given doubles.
pub fn server_with(
    config: ProxyConfig,
    transport: Arc<CountingTransport>,
    storage: Arc<CountingStorage>,
) -> HttpServer {
    HttpServer::with_components(config, transport, storage)
}

/// Wait for background cache stores to finish.
pub async fn settle(server: &HttpServer) {
    assert!(server.background_tasks().drain(Duration::from_secs(2)).await);
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

/// Raw-TCP origin that answers every request with `response` and records
/// each request head it receives.
pub async fn start_mock_origin(response: String) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let response = Arc::new(response);

    let recorded = seen.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let recorded = recorded.clone();
                    let response = response.clone();
                    tokio::spawn(async move {
                        let mut head = Vec::new();
                        let mut buf = [0u8; 1024];
                        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => head.extend_from_slice(&buf[..n]),
                            }
                        }
                        recorded
                            .lock()
                            .unwrap()
                            .push(String::from_utf8_lossy(&head).into_owned());
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, seen)
}

/// Canned HTTP/1.1 response text with a correct Content-Length.
pub fn http_response(status_line: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        content_type,
        body.len(),
        body
    )
}

/// TCP server that echoes every byte back.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// Raw-TCP origin that sends `head` at once and `body` after `delay`.
pub async fn start_staged_origin(head: String, body: String, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let head = Arc::new(head);
    let body = Arc::new(body);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let head = head.clone();
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let mut seen = Vec::new();
                while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => seen.extend_from_slice(&buf[..n]),
                    }
                }
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(delay).await;
                let _ = socket.write_all(body.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}
