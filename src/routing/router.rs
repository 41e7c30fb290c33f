//! Request dispatch.
//!
//! Picks the handling path for a request from its method and path only.
//! No side effects.

use axum::http::Method;

/// Handling path chosen for an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// CONNECT: opaque byte relay, no caching, rewriting or security headers.
    Tunnel,
    /// Method outside the allowed set: 405 without contacting the origin.
    Reject,
    /// Proxied without cache participation: the root path, or a method that
    /// carries a body.
    Live,
    /// Proxied through the cache layer (non-root GET/HEAD).
    Cached,
}

impl Route {
    /// Label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Tunnel => "tunnel",
            Route::Reject => "rejected",
            Route::Live => "live",
            Route::Cached => "cached",
        }
    }
}

/// Method and path based dispatcher.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    tunnel_enabled: bool,
}

impl RequestRouter {
    pub fn new(tunnel_enabled: bool) -> Self {
        Self { tunnel_enabled }
    }

    pub fn route(&self, method: &Method, path: &str) -> Route {
        if *method == Method::CONNECT {
            return if self.tunnel_enabled {
                Route::Tunnel
            } else {
                Route::Reject
            };
        }

        match *method {
            Method::GET | Method::HEAD if is_root(path) => Route::Live,
            Method::GET | Method::HEAD => Route::Cached,
            Method::POST => Route::Live,
            _ => Route::Reject,
        }
    }
}

fn is_root(path: &str) -> bool {
    path.is_empty() || path == "/"
}
