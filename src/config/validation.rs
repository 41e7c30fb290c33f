//! Configuration validation.
//!
//! Semantic checks that serde cannot express. All problems are collected
//! so an operator sees every mistake in one pass.

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `origin.base_url`.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    validate_origin(&config.origin.base_url, &mut errors);

    let rewrite = &config.rewrite;
    if rewrite.from_domain.is_empty() != rewrite.to_domain.is_empty() {
        errors.push(ValidationError::new(
            "rewrite",
            "from_domain and to_domain must be set together",
        ));
    }
    if rewrite.content_types.iter().any(|t| t.trim().is_empty()) {
        errors.push(ValidationError::new(
            "rewrite.content_types",
            "entries must not be empty",
        ));
    }

    if config.timeouts.request_ms == 0 {
        errors.push(ValidationError::new("timeouts.request_ms", "must be greater than 0"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }

    let cache = &config.cache;
    if cache.enabled {
        if cache.ttl_secs == 0 {
            errors.push(ValidationError::new("cache.ttl_secs", "must be greater than 0"));
        }
        if cache.content_type_prefixes.iter().any(|p| p.trim().is_empty()) {
            errors.push(ValidationError::new(
                "cache.content_type_prefixes",
                "entries must not be empty",
            ));
        }
        if cache.vary_headers.iter().any(|h| axum::http::HeaderName::try_from(h.as_str()).is_err()) {
            errors.push(ValidationError::new(
                "cache.vary_headers",
                "entries must be valid header names",
            ));
        }
    }

    let obs = &config.observability;
    if !matches!(obs.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("'{}' is not one of: pretty, json", obs.log_format),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_origin(base_url: &str, errors: &mut Vec<ValidationError>) {
    let url = match Url::parse(base_url) {
        Ok(url) => url,
        Err(e) => {
            errors.push(ValidationError::new("origin.base_url", format!("invalid URL: {}", e)));
            return;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        errors.push(ValidationError::new("origin.base_url", "scheme must be http or https"));
    }
    if url.host_str().is_none() {
        errors.push(ValidationError::new("origin.base_url", "must include a host"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        errors.push(ValidationError::new(
            "origin.base_url",
            "must not carry a query or fragment",
        ));
    }
}
