//! HTTP server using Axum

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::{Config, ServerConfig};
use crate::error::{MirageError, Result};
use crate::proxy::{FetchDispatcher, RateLimiter, Upstream};

use super::middleware::{cors_layer, relaxed_cors};
use super::routes;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: FetchDispatcher,
    pub rate_limiter: RateLimiter,
    pub log_requests: bool,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(dispatcher: FetchDispatcher, rate_limiter: RateLimiter, log_requests: bool) -> Self {
        Self {
            dispatcher,
            rate_limiter,
            log_requests,
            started_at: Instant::now(),
        }
    }
}

/// Proxy HTTP server
pub struct ProxyServer {
    config: ServerConfig,
    state: AppState,
}

impl ProxyServer {
    /// Create a new server
    pub fn new(config: &Config, upstream: Arc<dyn Upstream>, rate_limiter: RateLimiter) -> Self {
        let state = AppState::new(
            FetchDispatcher::new(upstream),
            rate_limiter,
            config.server.log_requests,
        );

        Self {
            config: config.server.clone(),
            state,
        }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone(), &self.config.static_dir)
            .layer(CompressionLayer::new())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(relaxed_cors))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` flips to true
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| MirageError::InvalidConfig(format!("Invalid listen address: {}", e)))?;

        let router = self.build_router();

        info!("Proxy server listening on {}", addr);
        info!("Serving static files from {}", self.config.static_dir);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await?;

        info!("Proxy server shut down");
        Ok(())
    }
}
