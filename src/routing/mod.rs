//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs
//!     → Route::{Tunnel, Reject, Live, Cached}
//! ```
//!
//! # Design Decisions
//! - There is a single origin, so routing only selects a handling path
//! - Deterministic: same method and path always give the same route

pub mod router;

pub use router::{RequestRouter, Route};
