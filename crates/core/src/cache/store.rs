use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use super::observer::{CacheEvent, CacheObserver, NoopCacheObserver};

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// `None` when the TTL reaches past what `Instant` can represent.
    fn expires_at(&self) -> Option<Instant> {
        self.inserted_at.checked_add(self.ttl)
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|expires_at| now >= expires_at)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// Bounded string-keyed map with a TTL per entry.
///
/// Reads past an entry's TTL behave as misses and drop the entry. Keys live in
/// a sharded map, so readers and writers of different keys do not contend on a
/// single lock; writes to the same key are last-writer-wins. When full, expired
/// entries are purged first and then the entry closest to expiry is evicted.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    max_entries: usize,
    observer: Arc<dyn CacheObserver>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self::with_observer(max_entries, Arc::new(NoopCacheObserver))
    }

    pub fn with_observer(max_entries: usize, observer: Arc<dyn CacheObserver>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            observer,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let (value, expired) = match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => (None, true),
            Some(entry) => (Some(entry.value.clone()), false),
            None => (None, false),
        };

        if expired && self.entries.remove_if(key, |_, entry| entry.is_expired(now)).is_some() {
            self.observer.observe(CacheEvent::Expired { key });
        }

        match value {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.observer.observe(CacheEvent::Hit { key });
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.observer.observe(CacheEvent::Miss { key });
                None
            }
        }
    }

    /// Replaces any existing entry and restarts its age at zero.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.purge_expired();
            while self.entries.len() >= self.max_entries {
                if !self.evict_nearest_expiry(None) {
                    break;
                }
            }
        }

        self.entries.insert(key.clone(), CacheEntry { value, inserted_at: Instant::now(), ttl });
        self.observer.observe(CacheEvent::Set { key: &key, ttl });

        // Concurrent inserts of distinct keys can overshoot the bound between
        // the check above and the insert.
        while self.entries.len() > self.max_entries {
            if !self.evict_nearest_expiry(Some(&key)) {
                break;
            }
        }
    }

    /// Removes `key` regardless of remaining TTL. Returns whether an entry existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.observer.observe(CacheEvent::Invalidated { key });
        }
        removed
    }

    pub fn clear(&self) {
        let entries = self.entries.len();
        self.entries.clear();
        self.observer.observe(CacheEvent::Cleared { entries });
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();

        let mut removed = 0;
        for key in expired {
            if self.entries.remove_if(&key, |_, entry| entry.is_expired(now)).is_some() {
                removed += 1;
                self.observer.observe(CacheEvent::Expired { key: &key });
            }
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.iter().filter(|entry| !entry.value().is_expired(now)).count();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let hit_rate = if hits > 0 { hits as f64 / (hits + misses) as f64 } else { 0.0 };

        CacheStats {
            entries,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate,
        }
    }

    fn evict_nearest_expiry(&self, keep: Option<&str>) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|entry| keep.map_or(true, |keep| entry.key().as_str() != keep))
            .min_by_key(|entry| {
                let expires_at = entry.value().expires_at();
                (expires_at.is_none(), expires_at)
            })
            .map(|entry| entry.key().clone());

        match victim {
            Some(key) => {
                if self.entries.remove(&key).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    self.observer.observe(CacheEvent::Evicted { key: &key });
                }
                true
            }
            None => false,
        }
    }
}
