//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, error boundary)
//!     → [routing decides the handling path]
//!         CONNECT → tunnel.rs (byte relay)
//!         other   → request.rs (origin request builder)
//!                 → [upstream transport, rewriter]
//!                 → response.rs (hop-by-hop removal, security headers)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod tunnel;

pub use request::{OriginRequestBuilder, X_REQUEST_ID};
pub use server::HttpServer;
