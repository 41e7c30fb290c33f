//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge proxy.
///
/// Constructed once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single upstream origin every request is forwarded to.
    pub origin: OriginConfig,

    /// Response body domain rewriting.
    pub rewrite: RewriteConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// CONNECT tunnel settings.
    pub tunnel: TunnelConfig,

    /// Security hardening settings.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Deadline applied to every origin call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_ms)
    }

    /// Lifetime of a stored cache entry.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Connect deadline for origin and tunnel connections.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.connect_secs)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Scheme and authority of the origin, e.g. "https://origin.example.org".
    /// Inbound path and query are appended verbatim.
    pub base_url: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

impl OriginConfig {
    /// Base URL without a trailing slash, ready for path concatenation.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Domain rewriting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Literal string searched for in eligible bodies. Empty disables rewriting.
    pub from_domain: String,

    /// Literal replacement string.
    pub to_domain: String,

    /// Content-Type substrings that make a response eligible for rewriting.
    pub content_types: Vec<String>,

    /// Ask the origin for uncompressed bodies so text stays rewritable.
    pub force_identity_encoding: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            from_domain: String::new(),
            to_domain: String::new(),
            content_types: vec![
                "text/html".to_string(),
                "text/css".to_string(),
                "application/javascript".to_string(),
                "text/javascript".to_string(),
            ],
            force_identity_encoding: true,
        }
    }
}

impl RewriteConfig {
    /// Whether a rewrite domain pair is configured.
    pub fn is_active(&self) -> bool {
        !self.from_domain.is_empty()
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching.
    pub enabled: bool,

    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,

    /// Content-Type prefixes eligible for storage.
    pub content_type_prefixes: Vec<String>,

    /// Request headers that take part in the cache key (content negotiation).
    pub vary_headers: Vec<String>,

    /// Largest body (bytes) that will be stored.
    pub max_entry_bytes: usize,

    /// Maximum number of entries held by the in-memory storage (0 = unbounded).
    pub max_entries: usize,

    /// Interval between sweeps of expired entries in seconds (0 = never).
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            content_type_prefixes: vec![
                "text/".to_string(),
                "application/javascript".to_string(),
            ],
            vary_headers: vec!["accept".to_string(), "accept-language".to_string()],
            max_entry_bytes: 8 * 1024 * 1024, // 8MB
            max_entries: 10_000,
            sweep_interval_secs: 300,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Origin response deadline (headers received) in milliseconds.
    pub request_ms: u64,

    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Upper bound on draining background work at shutdown, in seconds.
    pub shutdown_drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 10_000,
            connect_secs: 10,
            shutdown_drain_secs: 5,
        }
    }
}

/// CONNECT tunnel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Accept CONNECT requests. When disabled CONNECT is answered with 405.
    pub enabled: bool,

    /// Port used when the tunnel target omits one.
    pub default_port: u16,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_port: 443,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Attach security headers to proxied responses.
    pub headers_enabled: bool,
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            headers_enabled: true,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
