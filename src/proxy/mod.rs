//! Proxy core
//!
//! This module provides:
//! - Target validation and per-request rewrite context
//! - Per (client, target) sliding-window rate limiting
//! - Upstream fetching with content-type dispatch to the rewriters

pub mod fetch;
pub mod middleware;
pub mod target;

pub use fetch::{ContentKind, FetchDispatcher, HttpUpstream, ProxiedResponse, Upstream};
pub use middleware::RateLimiter;
pub use target::{ProxyBase, RateKey, RewriteContext, TargetUrl};
