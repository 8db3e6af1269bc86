//! Background services

pub mod rate_limit_cleanup;

pub use rate_limit_cleanup::{
    RateLimitCleanupConfig, RateLimitCleanupHandle, RateLimitCleanupService,
};
