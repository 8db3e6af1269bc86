//! HTTP server implementation
//!
//! Serves the proxy route, a health check and static files, with relaxed
//! CORS and gzip compression on every response.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{AppState, ProxyServer};
