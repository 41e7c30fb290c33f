//! Literal domain substitution over textual response bodies.
//!
//! Eligibility is decided from the `Content-Type` header alone (substring,
//! case-sensitive as received). Eligible bodies are read once and every
//! occurrence of the source string is replaced. Ineligible bodies are never
//! read.

use std::borrow::Cow;

use axum::body::Bytes;
use axum::http::{header, HeaderMap};
use regex::bytes::{NoExpand, Regex};

use crate::config::RewriteConfig;
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::upstream::{UpstreamBody, UpstreamResponse};

/// Rewrites eligible upstream bodies.
#[derive(Debug, Clone)]
pub struct ContentRewriter {
    /// Escaped source string; `None` disables rewriting.
    pattern: Option<Regex>,
    to: String,
    content_types: Vec<String>,
}

impl ContentRewriter {
    pub fn new(config: &RewriteConfig) -> Self {
        let pattern = if config.from_domain.is_empty() {
            None
        } else {
            match Regex::new(&regex::escape(&config.from_domain)) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::error!(error = %e, "Rewrite pattern rejected; rewriting disabled");
                    None
                }
            }
        };

        Self {
            pattern,
            to: config.to_domain.clone(),
            content_types: config.content_types.clone(),
        }
    }

    /// Whether a response with these headers gets its body rewritten.
    pub fn is_eligible(&self, headers: &HeaderMap) -> bool {
        if self.pattern.is_none() || is_encoded(headers) {
            return false;
        }
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        self.content_types
            .iter()
            .any(|t| content_type.contains(t.as_str()))
    }

    /// Apply the substitution to an upstream response.
    ///
    /// Eligible responses come back with a `Buffered` body and no stale
    /// `Content-Length`; everything else is returned untouched.
    pub async fn apply(&self, mut response: UpstreamResponse) -> Result<UpstreamResponse, ProxyError> {
        if !self.is_eligible(&response.headers) {
            return Ok(response);
        }

        let original = response.body.materialize().await?;
        let rewritten = self.rewrite_bytes(&original);
        if rewritten != original {
            metrics::record_rewrite();
            tracing::debug!(
                before = original.len(),
                after = rewritten.len(),
                "Rewrote response body"
            );
        }

        response.headers.remove(header::CONTENT_LENGTH);
        response.body = UpstreamBody::Buffered(rewritten);
        Ok(response)
    }

    /// Replace every occurrence of the source string in `body`.
    ///
    /// Non-overlapping, left to right; replacements are not rescanned.
    pub fn rewrite_bytes(&self, body: &Bytes) -> Bytes {
        let Some(pattern) = &self.pattern else {
            return body.clone();
        };
        match pattern.replace_all(body, NoExpand(self.to.as_bytes())) {
            Cow::Borrowed(_) => body.clone(),
            Cow::Owned(rewritten) => Bytes::from(rewritten),
        }
    }
}

/// A body with a non-identity Content-Encoding is opaque to substitution.
fn is_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim().eq_ignore_ascii_case("identity"))
        .unwrap_or(false)
}
