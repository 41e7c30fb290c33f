//! Response finalization.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers from the origin response
//! - Attach the fixed set of security headers (override semantics)
//! - Serialize finalized and cached responses for the client
//!
//! Error responses and tunnels never pass through here.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};

use crate::cache::CacheEntry;
use crate::error::ProxyError;
use crate::http::request::strip_hop_by_hop;
use crate::upstream::{UpstreamBody, UpstreamResponse};

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Security headers set on every proxied response.
pub const SECURITY_HEADERS: [(HeaderName, &str); 5] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (
        HeaderName::from_static("permissions-policy"),
        "geolocation=(), microphone=(), camera=()",
    ),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=31536000; includeSubDomains; preload",
    ),
];

/// Replace (not append) each security header.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS.iter() {
        headers.insert(name.clone(), HeaderValue::from_static(value));
    }
}

/// Produce the candidate final response from the (possibly rewritten)
/// upstream response. Status and body are kept; headers are cleaned and
/// hardened.
pub fn finalize(mut upstream: UpstreamResponse, security_headers: bool) -> UpstreamResponse {
    strip_hop_by_hop(&mut upstream.headers);
    if upstream.body.is_buffered() {
        // Recomputed from the buffered bytes.
        upstream.headers.remove(header::CONTENT_LENGTH);
    }
    if security_headers {
        apply_security_headers(&mut upstream.headers);
    }
    upstream
}

/// Serialize a finalized response.
pub fn into_response(finalized: UpstreamResponse) -> Response {
    build(finalized.status, finalized.headers, finalized.body.into_body())
}

/// Serialize a cache hit. The entry is already finalized.
pub fn from_cache_entry(entry: &CacheEntry) -> Response {
    let mut response = build(entry.status, entry.headers.clone(), Body::from(entry.body.clone()));
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static("HIT"));
    response
}

/// Mark a response that was fetched live and handed to the cache.
pub fn mark_cache_miss(headers: &mut HeaderMap) {
    headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Replace a streaming body with its buffered snapshot.
pub async fn buffer_body(mut finalized: UpstreamResponse) -> Result<UpstreamResponse, ProxyError> {
    if finalized.body.is_buffered() {
        return Ok(finalized);
    }
    let bytes = finalized.body.materialize().await?;
    finalized.headers.remove(header::CONTENT_LENGTH);
    finalized.body = UpstreamBody::Buffered(bytes);
    Ok(finalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use std::time::Duration;

    fn upstream(headers: &[(&'static str, &'static str)], body: UpstreamBody) -> UpstreamResponse {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(*k, HeaderValue::from_static(v));
        }
        UpstreamResponse {
            status: StatusCode::OK,
            headers: map,
            body,
        }
    }

    #[test]
    fn security_headers_override_origin_values() {
        let out = finalize(
            upstream(
                &[("x-frame-options", "DENY"), ("x-frame-options", "ALLOWALL")],
                UpstreamBody::Buffered(Bytes::new()),
            ),
            true,
        );

        assert_eq!(out.headers.get_all(header::X_FRAME_OPTIONS).iter().count(), 1);
        assert_eq!(out.headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
        for (name, value) in SECURITY_HEADERS.iter() {
            assert_eq!(out.headers[name], *value);
        }
    }

    #[test]
    fn disabled_security_headers_leave_map_alone() {
        let out = finalize(upstream(&[], UpstreamBody::Buffered(Bytes::new())), false);
        assert!(out.headers.get(header::STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[test]
    fn content_length_kept_only_for_streams() {
        let streamed = finalize(
            upstream(
                &[("content-length", "5"), ("transfer-encoding", "chunked")],
                UpstreamBody::Streaming(Body::from("hello")),
            ),
            true,
        );
        assert_eq!(streamed.headers[header::CONTENT_LENGTH], "5");
        assert!(streamed.headers.get(header::TRANSFER_ENCODING).is_none());

        let buffered = finalize(
            upstream(&[("content-length", "5")], UpstreamBody::Buffered(Bytes::from_static(b"hi"))),
            true,
        );
        assert!(buffered.headers.get(header::CONTENT_LENGTH).is_none());
    }

    #[tokio::test]
    async fn cache_hit_is_served_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/css"));
        apply_security_headers(&mut headers);
        let entry = CacheEntry::new(
            StatusCode::OK,
            headers,
            Bytes::from_static(b"body{}"),
            Duration::from_secs(60),
        );

        let response = from_cache_entry(&entry);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_CACHE], "HIT");
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"body{}");
    }

    #[tokio::test]
    async fn buffering_keeps_bytes() {
        let out = buffer_body(upstream(
            &[("content-length", "5")],
            UpstreamBody::Streaming(Body::from("hello")),
        ))
        .await
        .unwrap();
        assert_eq!(out.body.snapshot().unwrap(), Bytes::from_static(b"hello"));
        assert!(out.headers.get(header::CONTENT_LENGTH).is_none());
    }
}
