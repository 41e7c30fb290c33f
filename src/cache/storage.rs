//! Cache storage capability and the in-memory implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::cache::entry::CacheEntry;
use crate::cache::key::CacheKey;

/// Errors a storage backend may report on `put`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cache is full ({0} entries)")]
    Full(usize),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Key/value storage for cache entries.
///
/// Both operations must be safe under concurrent use and must replace
/// entries whole. Expiry is enforced by the cache layer, not by storage.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>>;
    async fn put(&self, key: CacheKey, entry: Arc<CacheEntry>) -> Result<(), StorageError>;
}

/// Concurrent in-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
    /// 0 = unbounded.
    max_entries: usize,
}

impl MemoryStorage {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry that is no longer fresh. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh_at(now));
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired entries until shutdown.
    pub fn spawn_sweeper(
        storage: Arc<MemoryStorage>,
        every: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = storage.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = storage.len(), "Swept expired cache entries");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Cache sweeper stopped");
                        break;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.entries.get(key).map(|r| Arc::clone(r.value()))
    }

    async fn put(&self, key: CacheKey, entry: Arc<CacheEntry>) -> Result<(), StorageError> {
        if self.max_entries > 0
            && !self.entries.contains_key(&key)
            && self.entries.len() >= self.max_entries
            && self.purge_expired() == 0
        {
            return Err(StorageError::Full(self.max_entries));
        }

        self.entries.insert(key, entry);
        Ok(())
    }
}
