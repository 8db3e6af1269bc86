//! Mirage Proxy Server - Entry Point
//!
//! Starts the proxy server and the rate limit cleanup service with graceful
//! shutdown support.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mirage::api::ProxyServer;
use mirage::config::{Config, LogConfig};
use mirage::proxy::{HttpUpstream, RateLimiter};
use mirage::services::{RateLimitCleanupConfig, RateLimitCleanupHandle, RateLimitCleanupService};

#[tokio::main]
async fn main() -> mirage::Result<()> {
    // Load configuration; refuses to start without an explicit LOG_REQUESTS
    let config = Config::from_env()?;

    init_tracing(&config.log);
    info!("Starting Mirage Proxy Server");

    let upstream = Arc::new(HttpUpstream::new(&config.upstream)?);

    let rate_limiter = RateLimiter::from_config(&config.rate_limit);
    if rate_limiter.is_enabled() {
        info!(
            "Rate limit: {} requests per {} ms per client and URL",
            config.rate_limit.max_requests, config.rate_limit.window_ms
        );
    }

    // Create shutdown channels
    let (shutdown_tx, _) = watch::channel(false);

    // Start rate limit cleanup service
    let (cleanup_handle, cleanup_shutdown) = RateLimitCleanupHandle::new();
    let cleanup_service = RateLimitCleanupService::new(
        rate_limiter.clone(),
        RateLimitCleanupConfig::from(&config.rate_limit),
    );
    let cleanup_task = tokio::spawn(async move {
        cleanup_service.run(cleanup_shutdown).await;
    });

    // Start proxy server
    let server = ProxyServer::new(&config, upstream, rate_limiter);
    let server_shutdown = shutdown_tx.subscribe();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run(server_shutdown).await {
            error!("Proxy server error: {}", e);
        }
    });

    info!("Server started on {}", config.server_addr());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    cleanup_handle.shutdown();

    let _ = tokio::join!(server_task, cleanup_task);

    info!("Mirage Proxy Server stopped");
    Ok(())
}

/// `RUST_LOG` wins over `LOG_LEVEL`; `LOG_FORMAT=json` switches to JSON lines
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("mirage={level},tower_http={level}", level = log.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
