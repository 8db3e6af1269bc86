//! Route definitions

use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;

use super::handlers;
use super::server::AppState;
use crate::proxy::target::PROXY_PATH;

/// Create the router with all routes. Anything unmatched is served from `static_dir`.
pub fn create_router(state: AppState, static_dir: &str) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(PROXY_PATH, get(handlers::proxy::proxy))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}
