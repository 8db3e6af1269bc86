//! Sliding-window rate limiting for proxied targets
//!
//! Each (client, normalized target) pair owns a list of admitted timestamps.
//! Entries are pruned lazily on access. Whole keys are evicted by `cleanup`,
//! which runs periodically and at most once per window when the table is
//! full. A full table with no stale keys evicts the least recently admitted
//! key, so the table never holds more than `max_keys` entries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::error::{MirageError, Result};
use crate::proxy::target::RateKey;

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Rate limiter for proxy requests
pub struct RateLimiter {
    /// Whether rate limiting is enabled
    enabled: bool,
    /// Admitted request timestamps (ms since epoch) per key
    windows: Arc<DashMap<RateKey, Vec<u64>>>,
    /// Admitted requests allowed inside one window
    max_requests: usize,
    /// Window length in milliseconds
    window_ms: u64,
    /// Hard cap on tracked keys
    max_keys: usize,
    /// Time of the last full sweep (ms since epoch)
    last_sweep: Arc<AtomicU64>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(enabled: bool, max_requests: usize, window_ms: u64, max_keys: usize) -> Self {
        Self {
            enabled,
            windows: Arc::new(DashMap::new()),
            max_requests,
            window_ms,
            max_keys: max_keys.max(1),
            last_sweep: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.enabled,
            config.max_requests,
            config.window_ms,
            config.max_keys,
        )
    }

    /// Create a disabled rate limiter
    pub fn disabled() -> Self {
        Self::new(false, 2, 10_000, 1)
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Admit or reject one request for `key` at `now_ms`.
    ///
    /// Rejected attempts are not recorded, so only admitted requests count
    /// toward the window.
    pub fn admit(&self, key: &RateKey, now_ms: u64) -> bool {
        if !self.enabled {
            return true;
        }

        if !self.windows.contains_key(key) && self.windows.len() >= self.max_keys {
            self.make_room(now_ms);
        }

        // The entry guard holds the shard lock for the whole prune-compare-push
        let mut entry = self.windows.entry(key.clone()).or_default();
        let timestamps = entry.value_mut();

        timestamps.retain(|&t| now_ms.saturating_sub(t) < self.window_ms);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now_ms);
        true
    }

    /// Check a request against the wall clock
    pub fn check(&self, key: &RateKey) -> Result<()> {
        if self.admit(key, now_ms()) {
            debug!("Rate limit check passed for {} -> {}", key.client, key.target);
            Ok(())
        } else {
            warn!("Rate limit exceeded for {} -> {}", key.client, key.target);
            Err(MirageError::RateLimitExceeded {
                client: key.client.clone(),
                target: key.target.clone(),
            })
        }
    }

    /// Free at least one slot in a full table. A full sweep runs at most once
    /// per window; otherwise the key with the oldest latest admission goes.
    fn make_room(&self, now_ms: u64) {
        let last_sweep = self.last_sweep.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last_sweep) >= self.window_ms {
            let evicted = self.cleanup(now_ms);
            debug!("Rate limit table full, evicted {} stale keys", evicted);
            if self.windows.len() < self.max_keys {
                return;
            }
        }

        let oldest = self
            .windows
            .iter()
            .min_by_key(|entry| entry.value().last().copied().unwrap_or(0))
            .map(|entry| entry.key().clone());

        if let Some(oldest) = oldest {
            self.windows.remove(&oldest);
            debug!("Rate limit table full, evicted {} -> {}", oldest.client, oldest.target);
        }
    }

    /// Drop keys with no timestamp inside the window. Returns how many were removed.
    pub fn cleanup(&self, now_ms: u64) -> usize {
        self.last_sweep.store(now_ms, Ordering::Relaxed);
        let before = self.windows.len();
        let window_ms = self.window_ms;

        self.windows.retain(|_, timestamps| {
            timestamps
                .last()
                .is_some_and(|&t| now_ms.saturating_sub(t) < window_ms)
        });

        before.saturating_sub(self.windows.len())
    }

    /// Get the number of tracked keys
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled,
            windows: Arc::clone(&self.windows),
            max_requests: self.max_requests,
            window_ms: self.window_ms,
            max_keys: self.max_keys,
            last_sweep: Arc::clone(&self.last_sweep),
        }
    }
}
