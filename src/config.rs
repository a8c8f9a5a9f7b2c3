//! Cache tuning constants
//!
//! All values are fixed at startup; nothing is reconfigured while running.

use std::time::Duration;

/// Data is republished weekly, so a day of caching is plenty
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Markets fetched concurrently per preload batch
pub const DEFAULT_PRELOAD_BATCH_SIZE: usize = 3;

/// Upper bound on a single source request
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Oldest persisted entries dropped when storage is full
pub const DEFAULT_EVICTION_COUNT: usize = 3;

/// Pause before preloading so the foreground request gets the bandwidth
pub const DEFAULT_PRELOAD_DELAY: Duration = Duration::from_millis(1500);

/// Background tasks allowed to run at once
pub const DEFAULT_BACKGROUND_WORKERS: usize = 4;

/// Configuration for the cache orchestrator
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age before an entry is considered stale
    pub ttl: Duration,
    pub preload_batch_size: usize,
    pub fetch_timeout: Duration,
    pub eviction_count: usize,
    pub preload_delay: Duration,
    pub background_workers: usize,
    /// Whether a non-active resolve of a stale entry schedules a refresh
    pub revalidate_stale_on_preload: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            preload_batch_size: DEFAULT_PRELOAD_BATCH_SIZE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            eviction_count: DEFAULT_EVICTION_COUNT,
            preload_delay: DEFAULT_PRELOAD_DELAY,
            background_workers: DEFAULT_BACKGROUND_WORKERS,
            revalidate_stale_on_preload: true,
        }
    }
}

impl CacheConfig {
    /// TTL as a chrono duration for timestamp arithmetic
    pub fn ttl_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::max_value())
    }
}
