//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to origin:
//!     → timeouts.rs (absolute deadline, cancel on expiry)
//!     → On failure: surfaced to the error boundary, never retried
//! ```

pub mod timeouts;
