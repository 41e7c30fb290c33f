//! Registry for fire-and-forget background work.
//!
//! Cache stores run after the client response has been returned. They are
//! spawned through [`BackgroundTasks`] so shutdown can wait (bounded) for them
//! instead of silently dropping them.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Tracks in-flight background tasks.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    active: AtomicU64,
    idle: Notify,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task that is accounted for until it completes.
    pub fn spawn<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.track(name);
        tokio::spawn(async move {
            fut.await;
            drop(guard);
        });
    }

    fn track(&self, name: &'static str) -> TaskGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            inner: Arc::clone(&self.inner),
            name,
        }
    }

    /// Number of tasks still running.
    pub fn active_count(&self) -> u64 {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait until every tracked task finished or `timeout` elapsed.
    ///
    /// Returns `true` when the registry drained completely.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait_idle = async {
            loop {
                let notified = self.inner.idle.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, wait_idle).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    abandoned = self.active_count(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Background tasks still running after drain timeout"
                );
                false
            }
        }
    }
}

/// Decrements the active count when the task ends (or panics).
struct TaskGuard {
    inner: Arc<Inner>,
    name: &'static str,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
        tracing::trace!(task = self.name, "Background task finished");
    }
}
