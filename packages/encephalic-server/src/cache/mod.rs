mod memory;

pub use memory::MemoryCache;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Counters reported by `/api/cache/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// Key/value store with a per-entry time-to-live.
///
/// Values are shared, so a reader holding an `Arc` keeps a consistent value
/// even if the entry is replaced or evicted meanwhile.
pub trait ResponseCache<V>: Send + Sync {
    /// Returns the value if present and not yet expired.
    fn get(&self, key: &str) -> Option<Arc<V>>;

    fn set(&self, key: String, value: Arc<V>, ttl: Duration);

    /// Drop every expired entry, returning how many were removed.
    fn purge_expired(&self) -> usize;

    fn stats(&self) -> CacheStats;
}
