//! Upstream (origin) subsystem.
//!
//! # Data Flow
//! ```text
//! OutboundRequest (built by http::request)
//!     → OriginTransport::send (reqwest by default, test doubles in tests)
//!     → UpstreamResponse { status, headers, UpstreamBody::Streaming }
//! ```

pub mod transport;

pub use transport::{HttpTransport, OriginTransport, OutboundRequest, UpstreamBody, UpstreamResponse};
