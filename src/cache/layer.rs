//! The cache layer: the only component that reads or writes cache storage.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, StatusCode};

use crate::cache::entry::CacheEntry;
use crate::cache::key::CacheKey;
use crate::cache::storage::CacheStorage;
use crate::config::CacheConfig;
use crate::lifecycle::BackgroundTasks;
use crate::observability::metrics;

/// Lookup, eligibility and fire-and-forget store.
#[derive(Clone)]
pub struct ResponseCache {
    storage: Arc<dyn CacheStorage>,
    tasks: BackgroundTasks,
    enabled: bool,
    ttl: Duration,
    content_type_prefixes: Vec<String>,
    vary_headers: Vec<HeaderName>,
    max_entry_bytes: usize,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig, storage: Arc<dyn CacheStorage>, tasks: BackgroundTasks) -> Self {
        let vary_headers = config
            .vary_headers
            .iter()
            .filter_map(|h| HeaderName::try_from(h.as_str()).ok())
            .collect();

        Self {
            storage,
            tasks,
            enabled: config.enabled,
            ttl: Duration::from_secs(config.ttl_secs),
            content_type_prefixes: config.content_type_prefixes.clone(),
            vary_headers,
            max_entry_bytes: config.max_entry_bytes,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Key for an inbound request.
    pub fn key_for(&self, absolute_url: &str, headers: &HeaderMap) -> CacheKey {
        CacheKey::derive(absolute_url, headers, &self.vary_headers)
    }

    /// Return a live entry for `key`, if any.
    pub async fn lookup(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        match self.storage.get(key).await {
            Some(entry) if entry.is_fresh() => {
                tracing::debug!(key = %key, "Cache hit");
                metrics::record_cache_event("hit");
                Some(entry)
            }
            Some(_) => {
                tracing::debug!(key = %key, "Cache entry expired");
                metrics::record_cache_event("miss");
                None
            }
            None => {
                metrics::record_cache_event("miss");
                None
            }
        }
    }

    /// Status is exactly 200, the content type starts with a cacheable
    /// prefix and the response is not client-specific.
    ///
    /// Path and method checks belong to the router; a response only reaches
    /// this question for keyed (non-root GET) requests.
    pub fn is_storable(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        if !self.enabled || status != StatusCode::OK {
            return false;
        }
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim_start();
        let cacheable_type = self
            .content_type_prefixes
            .iter()
            .any(|prefix| content_type.starts_with(prefix.as_str()));
        if !cacheable_type {
            return false;
        }

        if is_private(headers) {
            tracing::debug!("Response is client-specific, not caching");
            metrics::record_cache_event("skip");
            return false;
        }
        true
    }

    /// Whether a still-streaming body may be buffered for storage: its
    /// declared length must be known and within the entry size limit.
    pub fn should_buffer(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
            .map(|len| len <= self.max_entry_bytes)
            .unwrap_or(false)
    }

    /// Store a finalized response snapshot off the request path.
    ///
    /// Never fails the caller: oversize bodies are skipped and storage
    /// errors are logged from the background task.
    pub fn store(&self, key: CacheKey, status: StatusCode, headers: HeaderMap, body: Bytes) {
        if body.len() > self.max_entry_bytes {
            tracing::debug!(key = %key, size = body.len(), "Response too large to cache");
            metrics::record_cache_event("skip");
            return;
        }

        let entry = Arc::new(CacheEntry::new(status, headers, body, self.ttl));
        let storage = Arc::clone(&self.storage);
        self.tasks.spawn("cache-store", async move {
            let key_text = key.to_string();
            match storage.put(key, entry).await {
                Ok(()) => {
                    tracing::debug!(key = %key_text, "Cached response");
                    metrics::record_cache_event("store");
                }
                Err(e) => {
                    tracing::debug!(key = %key_text, error = %e, "Cache store skipped");
                    metrics::record_cache_event("skip");
                }
            }
        });
    }
}

/// `Set-Cookie`, or `Cache-Control` with `no-store` or `private`.
fn is_private(headers: &HeaderMap) -> bool {
    if headers.contains_key(header::SET_COOKIE) {
        return true;
    }
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|directive| directive.trim().split('=').next().unwrap_or("").trim())
        .any(|name| name.eq_ignore_ascii_case("no-store") || name.eq_ignore_ascii_case("private"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::MemoryStorage;
    use axum::http::HeaderValue;

    fn cache_with(config: CacheConfig) -> (ResponseCache, Arc<MemoryStorage>, BackgroundTasks) {
        let storage = Arc::new(MemoryStorage::new(0));
        let tasks = BackgroundTasks::new();
        let cache = ResponseCache::new(&config, storage.clone(), tasks.clone());
        (cache, storage, tasks)
    }

    fn text_headers(ct: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
        headers
    }

    #[tokio::test]
    async fn store_then_lookup_round_trip() {
        let (cache, storage, tasks) = cache_with(CacheConfig::default());
        let key = cache.key_for("https://edge.example.net/page.html", &HeaderMap::new());

        let headers = text_headers("text/html");
        cache.store(key.clone(), StatusCode::OK, headers.clone(), Bytes::from_static(b"hello"));
        assert!(tasks.drain(Duration::from_secs(1)).await);
        assert_eq!(storage.len(), 1);

        let entry = cache.lookup(&key).await.unwrap();
        assert_eq!(entry.status, StatusCode::OK);
        assert_eq!(entry.headers, headers);
        assert_eq!(&entry.body[..], b"hello");
    }

    #[tokio::test]
    async fn expired_entry_is_not_served() {
        let (cache, storage, _) = cache_with(CacheConfig::default());
        let key = cache.key_for("https://edge.example.net/old.css", &HeaderMap::new());
        storage
            .put(
                key.clone(),
                Arc::new(CacheEntry::new(
                    StatusCode::OK,
                    text_headers("text/css"),
                    Bytes::from_static(b"body{}"),
                    Duration::ZERO,
                )),
            )
            .await
            .unwrap();

        assert!(cache.lookup(&key).await.is_none());
    }

    #[tokio::test]
    async fn oversize_body_is_skipped() {
        let (cache, storage, tasks) = cache_with(CacheConfig {
            max_entry_bytes: 4,
            ..CacheConfig::default()
        });
        let key = cache.key_for("http://a/big.txt", &HeaderMap::new());
        cache.store(key, StatusCode::OK, text_headers("text/plain"), Bytes::from_static(b"too big"));
        assert!(tasks.drain(Duration::from_secs(1)).await);
        assert!(storage.is_empty());
    }

    #[test]
    fn storable_requires_200_and_prefix() {
        let (cache, _, _) = cache_with(CacheConfig::default());
        assert!(cache.is_storable(StatusCode::OK, &text_headers("text/html; charset=utf-8")));
        assert!(cache.is_storable(StatusCode::OK, &text_headers("application/javascript")));
        assert!(!cache.is_storable(StatusCode::OK, &text_headers("image/png")));
        assert!(!cache.is_storable(StatusCode::OK, &HeaderMap::new()));
        assert!(!cache.is_storable(StatusCode::NOT_FOUND, &text_headers("text/html")));
        assert!(!cache.is_storable(StatusCode::MOVED_PERMANENTLY, &text_headers("text/html")));
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let (cache, _, _) = cache_with(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        assert!(!cache.is_storable(StatusCode::OK, &text_headers("text/html")));
    }

    #[test]
    fn buffering_needs_known_small_length() {
        let (cache, _, _) = cache_with(CacheConfig {
            max_entry_bytes: 100,
            ..CacheConfig::default()
        });
        let mut headers = text_headers("text/plain");
        assert!(!cache.should_buffer(&headers));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("100"));
        assert!(cache.should_buffer(&headers));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("101"));
        assert!(!cache.should_buffer(&headers));
    }

    #[test]
    fn client_specific_responses_are_not_storable() {
        let (cache, _, _) = cache_with(CacheConfig::default());

        let mut cookie = text_headers("text/html");
        cookie.insert(header::SET_COOKIE, HeaderValue::from_static("session=abc; HttpOnly"));
        assert!(!cache.is_storable(StatusCode::OK, &cookie));

        for directive in ["no-store", "private", "max-age=60, Private", "private=\"x-user\""] {
            let mut headers = text_headers("text/html");
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(directive));
            assert!(!cache.is_storable(StatusCode::OK, &headers), "{}", directive);
        }

        let mut public = text_headers("text/html");
        public.insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=60"));
        assert!(cache.is_storable(StatusCode::OK, &public));
    }
}
