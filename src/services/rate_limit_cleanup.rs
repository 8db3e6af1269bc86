//! Rate limit table cleanup service
//!
//! Periodically evicts rate-limit keys whose whole window has expired so the
//! table stays bounded by recent traffic.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, instrument};

use crate::config::RateLimitConfig;
use crate::proxy::middleware::{now_ms, RateLimiter};

/// Rate limit cleanup configuration
#[derive(Clone)]
pub struct RateLimitCleanupConfig {
    /// How often to sweep the table (in seconds)
    pub check_interval_secs: u64,
}

impl Default for RateLimitCleanupConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
        }
    }
}

impl From<&RateLimitConfig> for RateLimitCleanupConfig {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            check_interval_secs: config.cleanup_interval_secs.max(1),
        }
    }
}

/// Rate limit cleanup service
pub struct RateLimitCleanupService {
    limiter: RateLimiter,
    config: RateLimitCleanupConfig,
}

impl RateLimitCleanupService {
    pub fn new(limiter: RateLimiter, config: RateLimitCleanupConfig) -> Self {
        Self { limiter, config }
    }

    /// Run until the shutdown channel flips to true
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.limiter.is_enabled() {
            info!("Rate limiting disabled, cleanup service not started");
            return;
        }

        info!(
            "Starting rate limit cleanup service (interval: {}s)",
            self.config.check_interval_secs
        );

        let mut cleanup_interval = interval(Duration::from_secs(self.config.check_interval_secs));
        cleanup_interval.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = cleanup_interval.tick() => {
                    self.sweep();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Rate limit cleanup service shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one eviction pass. Returns the number of evicted keys.
    pub fn sweep(&self) -> usize {
        let evicted = self.limiter.cleanup(now_ms());
        if evicted > 0 {
            debug!(
                "Evicted {} stale rate limit keys, {} remaining",
                evicted,
                self.limiter.tracked_keys()
            );
        }
        evicted
    }
}

/// Handle for managing the cleanup service
pub struct RateLimitCleanupHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl RateLimitCleanupHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
