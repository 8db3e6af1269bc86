//! Mirage - Rewriting Browse-Through Proxy
//!
//! Fetches a page on behalf of the caller and rewrites it so that every
//! follow-up request made by the rendered page loops back through the proxy.
//!
//! ## Features
//!
//! - HTML attribute, `<style>` and inline style rewriting
//! - CSS `url(...)` rewriting
//! - Injected client-side interception of `fetch` and `XMLHttpRequest`
//! - Per (client, target) sliding-window rate limiting with bounded state
//! - Static file serving, gzip compression and relaxed CORS

pub mod api;
pub mod config;
pub mod error;
pub mod proxy;
pub mod rewrite;
pub mod services;

pub use config::Config;
pub use error::{MirageError, Result};
