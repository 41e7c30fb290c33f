//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Keyed request (non-root GET/HEAD)
//!     → key.rs (absolute URL + negotiation headers)
//!     → layer.rs lookup (expiry enforced here)
//!         hit  → stored, already finalized response
//!         miss → origin → rewrite → finalize
//!               → layer.rs store (background task, last writer wins)
//!     → storage.rs (CacheStorage capability; MemoryStorage by default)
//! ```
//!
//! # Design Decisions
//! - Storage is injected, never a global
//! - Entries are immutable `Arc<CacheEntry>` snapshots
//! - No stale serving on origin failure

pub mod entry;
pub mod key;
pub mod layer;
pub mod storage;

pub use entry::CacheEntry;
pub use key::CacheKey;
pub use layer::ResponseCache;
pub use storage::{CacheStorage, MemoryStorage, StorageError};
