//! Proxy middleware

mod rate_limit;

pub use rate_limit::RateLimiter;
pub(crate) use rate_limit::now_ms;
