//! Inbound request handling and the origin request builder.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for tracing
//! - Resolve the client IP from edge-provided headers
//! - Derive the outbound request: target URL, forwarding headers, body
//!   policy and deadline
//!
//! # Design Decisions
//! - The inbound request is never mutated; a new header map is derived
//! - `X-Forwarded-For` is overwritten, not appended, so the origin sees a
//!   single authoritative value

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Request},
};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::resilience::timeouts::deadline_after;
use crate::upstream::OutboundRequest;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_ORIGINAL_HOST: HeaderName = HeaderName::from_static("x-original-host");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const CF_CONNECTING_IP: HeaderName = HeaderName::from_static("cf-connecting-ip");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Used when no client IP header is present.
pub const UNKNOWN_CLIENT_IP: &str = "0.0.0.0";

/// Hop-by-hop headers; never forwarded in either direction.
const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
    header::PROXY_AUTHENTICATE,
];

/// Request ID generator for tower-http's request-id layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let value = HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?;
        Some(RequestId::new(value))
    }
}

/// Request ID of an inbound request, or "unknown".
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Client IP: `CF-Connecting-IP`, then `X-Real-IP`, then `X-Forwarded-For`,
/// else [`UNKNOWN_CLIENT_IP`]. Empty values are skipped.
pub fn resolve_client_ip(headers: &HeaderMap) -> HeaderValue {
    [CF_CONNECTING_IP, X_REAL_IP, X_FORWARDED_FOR]
        .iter()
        .filter_map(|name| headers.get(name))
        .find(|v| !v.as_bytes().iter().all(u8::is_ascii_whitespace))
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(UNKNOWN_CLIENT_IP))
}

/// Host as the client addressed it: the Host header, else the URI authority.
pub fn inbound_host(parts: &Parts) -> Option<HeaderValue> {
    parts.headers.get(header::HOST).cloned().or_else(|| {
        parts
            .uri
            .authority()
            .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
    })
}

/// Absolute inbound URL (scheme, host, path and query).
///
/// TLS terminates at the edge, so `X-Forwarded-Proto` is trusted for the scheme.
pub fn absolute_url(parts: &Parts) -> String {
    let scheme = parts
        .headers
        .get(X_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_ascii_lowercase())
        .or_else(|| parts.uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());

    let host = inbound_host(parts)
        .and_then(|h| h.to_str().ok().map(str::to_string))
        .unwrap_or_default();

    format!("{}://{}{}", scheme, host, path_and_query(parts))
}

fn path_and_query(parts: &Parts) -> &str {
    parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Derives outbound requests from inbound ones.
#[derive(Debug, Clone)]
pub struct OriginRequestBuilder {
    base_url: String,
    timeout: Duration,
    force_identity_encoding: bool,
}

impl OriginRequestBuilder {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            base_url: config.origin.base().to_string(),
            timeout: config.request_timeout(),
            force_identity_encoding: config.rewrite.force_identity_encoding,
        }
    }

    /// Target URL: origin base + inbound path + inbound query, verbatim.
    pub fn target_url(&self, parts: &Parts) -> String {
        format!("{}{}", self.base_url, path_and_query(parts))
    }

    /// Build the outbound request. The deadline starts now.
    pub fn build(&self, parts: &Parts, body: Body) -> OutboundRequest {
        let mut headers = parts.headers.clone();
        strip_hop_by_hop(&mut headers);

        let original_host = inbound_host(parts);
        // The transport addresses the origin by its own authority.
        headers.remove(header::HOST);

        headers.insert(X_FORWARDED_FOR, resolve_client_ip(&parts.headers));
        if let Some(host) = original_host {
            headers.insert(X_ORIGINAL_HOST, host);
        }
        if self.force_identity_encoding {
            headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        }

        let body = match parts.method {
            Method::GET | Method::HEAD => None,
            _ => Some(body),
        };

        OutboundRequest {
            method: parts.method.clone(),
            url: self.target_url(parts),
            headers,
            body,
            deadline: deadline_after(self.timeout),
            timeout: self.timeout,
        }
    }
}
