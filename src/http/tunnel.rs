//! CONNECT tunnel handling.
//!
//! # Data Flow
//! ```text
//! CONNECT host[:port]
//!     → parse_target (authority-form, or origin-form path)
//!     → TcpStream::connect (connect deadline)
//!         fail → ProxyError::TunnelConnect (500 plain text)
//!         ok   → 200 Connection Established
//!              → [spawned] hyper upgrade → copy_bidirectional
//! ```
//!
//! No caching, rewriting or security headers on this path.

use std::fmt;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode, Uri},
    response::Response,
};
use hyper::ext::ReasonPhrase;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::error::ProxyError;
use crate::observability::metrics;

/// Where a tunnel connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelTarget {
    /// Hostname or IP literal, without IPv6 brackets.
    pub host: String,
    pub port: u16,
}

impl fmt::Display for TunnelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Extract `host[:port]` from a CONNECT request URI.
pub fn parse_target(uri: &Uri, default_port: u16) -> Result<TunnelTarget, ProxyError> {
    let raw = match uri.authority() {
        Some(authority) => authority.as_str(),
        None => uri.path().trim_start_matches('/'),
    };
    parse_host_port(raw, default_port).ok_or_else(|| ProxyError::BadTunnelTarget(raw.to_string()))
}

fn parse_host_port(raw: &str, default_port: u16) -> Option<TunnelTarget> {
    let raw = raw.trim();
    // Userinfo is meaningless for a tunnel target.
    if raw.is_empty() || raw.contains(['/', '@']) || raw.contains(char::is_whitespace) {
        return None;
    }

    let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = match after {
            "" => None,
            p => Some(p.strip_prefix(':')?),
        };
        (host, port)
    } else {
        match raw.split_once(':') {
            // An unbracketed IPv6 literal is ambiguous.
            Some((_, port)) if port.contains(':') => return None,
            Some((host, port)) => (host, Some(port)),
            None => (raw, None),
        }
    };

    if host.is_empty() {
        return None;
    }
    let port = match port {
        Some(p) => p.parse::<u16>().ok().filter(|p| *p != 0)?,
        None => default_port,
    };

    Some(TunnelTarget {
        host: host.to_string(),
        port,
    })
}

/// Open the tunnel and answer the CONNECT request.
///
/// The byte relay runs in its own task once the client connection has been
/// upgraded; it ends when either side closes.
pub async fn handle_connect(
    req: Request<Body>,
    default_port: u16,
    connect_timeout: Duration,
) -> Result<Response, ProxyError> {
    let target = match parse_target(req.uri(), default_port) {
        Ok(target) => target,
        Err(e) => {
            metrics::record_tunnel("failed");
            return Err(e);
        }
    };

    let upstream = match tokio::time::timeout(
        connect_timeout,
        TcpStream::connect((target.host.as_str(), target.port)),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            metrics::record_tunnel("failed");
            return Err(ProxyError::TunnelConnect {
                target: target.to_string(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            metrics::record_tunnel("failed");
            return Err(ProxyError::TunnelConnect {
                target: target.to_string(),
                reason: format!("connect timed out after {}s", connect_timeout.as_secs()),
            });
        }
    };

    tracing::debug!(target = %target, "Tunnel connected");
    metrics::record_tunnel("established");

    tokio::spawn(relay(req, upstream, target));

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    response
        .extensions_mut()
        .insert(ReasonPhrase::from_static(b"Connection Established"));
    Ok(response)
}

async fn relay(req: Request<Body>, mut upstream: TcpStream, target: TunnelTarget) {
    let upgraded = match hyper::upgrade::on(req).await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            tracing::warn!(target = %target, error = %e, "Tunnel upgrade failed");
            return;
        }
    };

    let mut client = TokioIo::new(upgraded);
    match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        Ok((sent, received)) => {
            tracing::debug!(target = %target, sent, received, "Tunnel closed");
        }
        Err(e) => {
            tracing::debug!(target = %target, error = %e, "Tunnel closed with error");
        }
    }
}
