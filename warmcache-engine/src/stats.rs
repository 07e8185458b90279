//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use warmcache_core::{BoxError, CacheError};

/// Point-in-time counters for a cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently held (always 1 for a single-value cache)
    pub entries: usize,
    /// Background loads started, batch loads counted once
    pub loads: u64,
    /// Loads whose loader returned an error
    pub load_failures: u64,
    /// Keyed entries removed by the idle sweep
    pub evictions: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    pub(crate) fn load_started(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a loader failure and wraps it for logging.
    pub(crate) fn load_failed(&self, err: BoxError) -> CacheError {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
        CacheError::load(err)
    }

    pub(crate) fn evicted(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize) -> CacheStats {
        CacheStats {
            entries,
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
