//! Request-level error taxonomy and the error boundary response.
//!
//! Every stage of the pipeline returns `ProxyError`; the handler converts it
//! into exactly one plain-text response. Error responses never carry the
//! security headers added by the finalizer.

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::observability::metrics;

/// Errors that can occur while handling a single inbound request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Inbound method outside the allowed set.
    #[error("Method Not Allowed: {0}")]
    MethodNotAllowed(Method),

    /// Origin did not send response headers before the deadline.
    #[error("origin did not respond within {}ms", .0.as_millis())]
    OriginTimeout(Duration),

    /// Origin could not be reached or the exchange failed.
    #[error("origin request failed: {0}")]
    OriginConnection(String),

    /// CONNECT target could not be reached.
    #[error("CONNECT to {target} failed: {reason}")]
    TunnelConnect { target: String, reason: String },

    /// CONNECT target is missing or malformed.
    #[error("invalid CONNECT target '{0}'")]
    BadTunnelTarget(String),

    /// Reading an upstream or inbound body failed.
    #[error("body error: {0}")]
    Body(String),

    /// Anything else that went wrong inside the pipeline.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status presented to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed(_) => "method_not_allowed",
            ProxyError::OriginTimeout(_) => "origin_timeout",
            ProxyError::OriginConnection(_) => "origin_connection",
            ProxyError::TunnelConnect { .. } => "tunnel_connect",
            ProxyError::BadTunnelTarget(_) => "bad_tunnel_target",
            ProxyError::Body(_) => "body",
            ProxyError::Internal(_) => "internal",
        }
    }

    fn body_text(&self) -> String {
        match self {
            ProxyError::MethodNotAllowed(_) => "Method Not Allowed".to_string(),
            other => format!("Proxy Error: {}", other),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        } else {
            tracing::warn!(error = %self, kind = self.kind(), "Request rejected");
        }
        metrics::record_error(self.kind());

        plain_text(status, self.body_text())
    }
}

/// Build a plain-text response with no other headers.
pub fn plain_text(status: StatusCode, body: impl Into<String>) -> Response {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn method_not_allowed_is_405() {
        let response = ProxyError::MethodNotAllowed(Method::PUT).into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Method Not Allowed");
    }

    #[tokio::test]
    async fn timeout_is_500_with_description() {
        let response = ProxyError::OriginTimeout(Duration::from_millis(250)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert!(response.headers().get("x-frame-options").is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            "Proxy Error: origin did not respond within 250ms"
        );
    }

    #[test]
    fn every_other_kind_is_server_error() {
        let errors = [
            ProxyError::OriginConnection("refused".into()),
            ProxyError::TunnelConnect {
                target: "internal.example.org:8443".into(),
                reason: "refused".into(),
            },
            ProxyError::BadTunnelTarget(String::new()),
            ProxyError::Body("reset".into()),
            ProxyError::Internal("boom".into()),
        ];
        for err in errors {
            assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
