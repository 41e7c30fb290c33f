//! Cache key derivation.

use std::fmt;

use axum::http::{HeaderMap, HeaderName};

/// Deterministic identifier for a cacheable request.
///
/// Built from the absolute inbound URL plus the values of the configured
/// content-negotiation headers. Only GET/HEAD requests are ever keyed, so
/// the method is implied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key. Absent headers contribute an empty value, repeated
    /// headers are joined with ", " in received order.
    pub fn derive(absolute_url: &str, headers: &HeaderMap, vary: &[HeaderName]) -> Self {
        let mut key = String::with_capacity(absolute_url.len() + 32 * vary.len());
        key.push_str(absolute_url);

        for name in vary {
            let values: Vec<&str> = headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(str::trim)
                .collect();
            key.push('\n');
            key.push_str(name.as_str());
            key.push('=');
            key.push_str(&values.join(", "));
        }

        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys are multi-line; keep log lines flat.
        write!(f, "{}", self.0.replace('\n', " | "))
    }
}
