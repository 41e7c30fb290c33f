//! HTTP server setup and the proxy pipeline.
//!
//! # Responsibilities
//! - Create the Axum Router with a single fallback handler
//! - Wire up middleware (request ID, tracing, panic catcher, body limit)
//! - Dispatch each request by route and convert failures at one boundary
//! - Run the pipeline: cache → origin → rewrite → finalize → cache store
//! - Serve with graceful shutdown and drain background cache stores

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::cache::{CacheStorage, MemoryStorage, ResponseCache};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::request::{absolute_url, request_id, OriginRequestBuilder, UuidRequestId};
use crate::http::response;
use crate::http::tunnel;
use crate::lifecycle::{shutdown, BackgroundTasks};
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::rewrite::ContentRewriter;
use crate::routing::{RequestRouter, Route};
use crate::upstream::{HttpTransport, OriginTransport};

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    router: RequestRouter,
    builder: Arc<OriginRequestBuilder>,
    transport: Arc<dyn OriginTransport>,
    rewriter: Arc<ContentRewriter>,
    cache: ResponseCache,
    security_headers: bool,
    tunnel_default_port: u16,
    connect_timeout: Duration,
}

/// HTTP server for the edge proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    tasks: BackgroundTasks,
    sweeper: Option<Arc<MemoryStorage>>,
}

impl HttpServer {
    /// Create a server with the default reqwest transport and in-memory cache.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let transport = Arc::new(HttpTransport::new(config.connect_timeout())?);
        let storage = Arc::new(MemoryStorage::new(config.cache.max_entries));
        let mut server = Self::with_components(config, transport, storage.clone());
        server.sweeper = Some(storage);
        Ok(server)
    }

    /// Create a server around injected transport and storage capabilities.
    pub fn with_components(
        config: ProxyConfig,
        transport: Arc<dyn OriginTransport>,
        storage: Arc<dyn CacheStorage>,
    ) -> Self {
        let tasks = BackgroundTasks::new();
        let state = AppState {
            router: RequestRouter::new(config.tunnel.enabled),
            builder: Arc::new(OriginRequestBuilder::new(&config)),
            transport,
            rewriter: Arc::new(ContentRewriter::new(&config.rewrite)),
            cache: ResponseCache::new(&config.cache, storage, tasks.clone()),
            security_headers: config.security.headers_enabled,
            tunnel_default_port: config.tunnel.default_port,
            connect_timeout: config.connect_timeout(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            tasks,
            sweeper: None,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// A fallback rather than path routes, so authority-form CONNECT
    /// targets reach the handler too.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id(request.headers()),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(CatchPanicLayer::custom(panic_response))
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size)),
            )
    }

    /// The fully layered router, for driving requests without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Registry of in-flight cache stores.
    pub fn background_tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires, then drain background work.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            origin = %self.config.origin.base(),
            "HTTP server starting"
        );

        let sweep_every = self.config.cache.sweep_interval_secs;
        if let Some(storage) = self.sweeper.clone() {
            if self.config.cache.enabled && sweep_every > 0 {
                MemoryStorage::spawn_sweeper(
                    storage,
                    Duration::from_secs(sweep_every),
                    shutdown.resubscribe(),
                );
            }
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!(pending = self.tasks.active_count(), "HTTP server stopped");
        let drain = Duration::from_secs(self.config.timeouts.shutdown_drain_secs);
        if self.tasks.drain(drain).await {
            tracing::debug!("Background tasks drained");
        }
        Ok(())
    }
}

/// Main proxy handler and the per-request error boundary.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let route = state.router.route(&method, request.uri().path());

    tracing::debug!(
        method = %method,
        path = %request.uri().path(),
        route = route.as_str(),
        "Proxying request"
    );

    let result = match route {
        Route::Reject => Err(ProxyError::MethodNotAllowed(method.clone())),
        Route::Tunnel => {
            tunnel::handle_connect(request, state.tunnel_default_port, state.connect_timeout).await
        }
        Route::Live | Route::Cached => forward(&state, route, request).await,
    };

    let response = result.unwrap_or_else(|e| e.into_response());
    metrics::record_request(method.as_str(), response.status().as_u16(), route.as_str(), start);
    response
}

async fn forward(state: &AppState, route: Route, request: Request<Body>) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();

    let cache_key = if route == Route::Cached && state.cache.is_enabled() {
        let key = state.cache.key_for(&absolute_url(&parts), &parts.headers);
        if let Some(entry) = state.cache.lookup(&key).await {
            return Ok(response::from_cache_entry(&entry));
        }
        Some(key)
    } else {
        None
    };

    let outbound = state.builder.build(&parts, body);
    let (deadline, budget) = (outbound.deadline, outbound.timeout);
    let upstream = with_deadline(deadline, budget, state.transport.send(outbound)).await?;

    tracing::debug!(
        status = upstream.status.as_u16(),
        content_type = upstream.content_type(),
        "Origin responded"
    );

    // The deadline ends once headers are in; body reads are not bounded by it.
    // HEAD bodies are empty, so the origin's Content-Length must survive.
    let upstream = if parts.method == Method::HEAD {
        upstream
    } else {
        state.rewriter.apply(upstream).await?
    };
    let mut finalized = response::finalize(upstream, state.security_headers);

    // HEAD responses carry no body and must not shadow the GET entry.
    let store_key = cache_key.filter(|_| parts.method == Method::GET);
    if let Some(key) = store_key {
        if state.cache.is_storable(finalized.status, &finalized.headers) {
            if !finalized.body.is_buffered() && state.cache.should_buffer(&finalized.headers) {
                finalized = response::buffer_body(finalized).await?;
            }
            if let Some(bytes) = finalized.body.snapshot() {
                state
                    .cache
                    .store(key, finalized.status, finalized.headers.clone(), bytes);
                response::mark_cache_miss(&mut finalized.headers);
            }
        }
    }

    Ok(response::into_response(finalized))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "Handler panicked");
    ProxyError::Internal("request handler panicked".to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn panics_become_plain_text_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Proxy Error: internal error: request handler panicked");
    }

    #[test]
    fn default_server_builds() {
        let server = HttpServer::new(ProxyConfig::default()).unwrap();
        assert!(server.sweeper.is_some());
        assert_eq!(server.background_tasks().active_count(), 0);
    }
}
