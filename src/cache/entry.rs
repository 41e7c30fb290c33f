//! Cached response snapshots.

use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};

/// An immutable, fully finalized response snapshot.
///
/// Entries are shared as `Arc<CacheEntry>` and never mutated after insertion;
/// a newer store for the same key replaces the whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, ttl: Duration) -> Self {
        Self {
            status,
            headers,
            body,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    /// Instant after which the entry may no longer be served.
    pub fn expires_at(&self) -> Instant {
        self.inserted_at + self.ttl
    }

    /// `now < inserted_at + ttl`.
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now < self.expires_at()
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Instant::now())
    }
}
