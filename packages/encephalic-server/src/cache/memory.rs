use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{CacheStats, ResponseCache};

struct Entry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    /// Keys from oldest to newest insert
    order: VecDeque<String>,
    stats: CacheStats,
}

impl<V> Inner<V> {
    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            let entries = &self.entries;
            self.order.retain(|k| entries.contains_key(k));
            self.stats.expirations += removed as u64;
        }
        removed
    }
}

/// In-process [`ResponseCache`] bounded by entry count.
///
/// When full, expired entries are purged first; if that frees nothing the
/// oldest insert is evicted.
pub struct MemoryCache<V> {
    name: &'static str,
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

impl<V> MemoryCache<V> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity.min(1024)),
                order: VecDeque::new(),
                stats: CacheStats {
                    capacity,
                    ..CacheStats::default()
                },
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Send + Sync> ResponseCache<V> for MemoryCache<V> {
    fn get(&self, key: &str) -> Option<Arc<V>> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let value = entry.value.clone();
                inner.stats.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.remove(key);
            inner.stats.expirations += 1;
        }
        inner.stats.misses += 1;
        None
    }

    fn set(&self, key: String, value: Arc<V>, ttl: Duration) {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        // A re-set counts as a fresh insert
        if inner.entries.contains_key(&key) {
            inner.remove(&key);
        }

        if inner.entries.len() >= self.capacity {
            inner.purge_expired(now);
        }
        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            inner.stats.evictions += 1;
            tracing::debug!(cache = self.name, key = %oldest, "Evicted oldest cache entry");
        }

        let expires_at = now.checked_add(ttl).unwrap_or(now + Duration::from_secs(86_400 * 365));
        inner.order.push_back(key.clone());
        inner.entries.insert(key, Entry { value, expires_at });
    }

    fn purge_expired(&self) -> usize {
        self.inner.lock().purge_expired(Instant::now())
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }
}
