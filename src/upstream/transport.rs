//! Origin transport: the capability that actually talks to the origin.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, StatusCode},
};
use reqwest::redirect::Policy;
use tokio::time::Instant;

use crate::error::ProxyError;

/// A request ready to be sent to the origin.
///
/// Built fresh per inbound request and never retained.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    /// Absolute origin URL (`base + path + query`).
    pub url: String,
    pub headers: HeaderMap,
    /// `None` for GET/HEAD, otherwise the inbound body stream untouched.
    pub body: Option<Body>,
    /// Instant by which the origin must have sent response headers.
    pub deadline: Instant,
    /// The budget the deadline was derived from.
    pub timeout: Duration,
}

/// Response body that can be read exactly once.
///
/// `Streaming` is the live origin stream. Once it has been read it only
/// exists as `Buffered`, and every later stage works on that snapshot:
/// the rewriter owns the single read, the cache receives a cheap clone of
/// the buffered bytes and the finalizer sends the original.
#[derive(Debug)]
pub enum UpstreamBody {
    Streaming(Body),
    Buffered(Bytes),
}

impl UpstreamBody {
    /// Read the body to completion. Consumes the stream.
    pub async fn materialize(self) -> Result<Bytes, ProxyError> {
        match self {
            UpstreamBody::Buffered(bytes) => Ok(bytes),
            UpstreamBody::Streaming(body) => axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(|e| ProxyError::Body(e.to_string())),
        }
    }

    /// A duplicate of the buffered bytes, if the body has been materialized.
    pub fn snapshot(&self) -> Option<Bytes> {
        match self {
            UpstreamBody::Buffered(bytes) => Some(bytes.clone()),
            UpstreamBody::Streaming(_) => None,
        }
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self, UpstreamBody::Buffered(_))
    }

    pub fn into_body(self) -> Body {
        match self {
            UpstreamBody::Buffered(bytes) => Body::from(bytes),
            UpstreamBody::Streaming(body) => body,
        }
    }
}

/// What the origin answered.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    /// Value of the Content-Type header, empty when absent or not visible ASCII.
    pub fn content_type(&self) -> &str {
        self.headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// Sends outbound requests to the origin.
///
/// Implementations must not follow redirects. The caller enforces
/// `OutboundRequest::deadline` around `send`, which cancels the call by
/// dropping it.
#[async_trait]
pub trait OriginTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError>;
}

/// Default transport backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(connect_timeout)
            .no_proxy()
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OriginTransport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::OriginTimeout(request.timeout)
            } else {
                ProxyError::OriginConnection(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = Body::from_stream(response.bytes_stream());

        Ok(UpstreamResponse {
            status,
            headers,
            body: UpstreamBody::Streaming(body),
        })
    }
}
