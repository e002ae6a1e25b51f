//! In-memory response cache keyed by inbound request-target
//!
//! Entries carry an absolute expiry in epoch milliseconds. [`ResponseCache::get`]
//! returns entries regardless of freshness; callers compare
//! [`CacheEntry::is_fresh`] against their own clock reading. Stale entries are
//! overwritten by the next fetch for the same key, or dropped by
//! [`ResponseCache::evict_expired`] when the background sweeper runs.
//! Without the sweeper, entries for keys that are never requested again stay
//! resident for the life of the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use dashmap::DashMap;

/// Current wall-clock time in milliseconds since the Unix epoch
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One previously fetched upstream response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Response payload
    pub body: Bytes,
    /// Upstream headers, one value per name
    pub headers: HashMap<HeaderName, HeaderValue>,
    /// Upstream status code
    pub status: StatusCode,
    /// Expiry in milliseconds since the Unix epoch
    pub expires_at: i64,
}

impl CacheEntry {
    /// Build an entry that expires `ttl` after `now_ms`
    #[must_use]
    pub fn new(
        status: StatusCode,
        headers: HashMap<HeaderName, HeaderValue>,
        body: Bytes,
        now_ms: i64,
        ttl: Duration,
    ) -> Self {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            body,
            headers,
            status,
            expires_at: now_ms.saturating_add(ttl_ms),
        }
    }

    /// Valid for serving iff `now_ms < expires_at`
    #[must_use]
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at
    }
}

/// Thread-safe response cache
///
/// Concurrent writers for the same key race; the last `put` wins.
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    stats: CacheStats,
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Fresh entries served
    pub hits: AtomicU64,
    /// Lookups that found nothing or a stale entry
    pub misses: AtomicU64,
    /// Stale entries removed by the sweeper
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Current hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Current miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Current eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Hit rate in the range 0.0-1.0
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl ResponseCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Look up `key`, fresh or not
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Insert or overwrite the entry for `key`
    pub fn put(&self, key: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(key.into(), entry);
    }

    /// Return the entry for `key` only if it is fresh at `now_ms`,
    /// recording a hit or miss.
    pub fn get_fresh(&self, key: &str, now_ms: i64) -> Option<CacheEntry> {
        match self.get(key) {
            Some(entry) if entry.is_fresh(now_ms) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            _ => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Remove every entry that is stale at `now_ms`, returning how many went
    pub fn evict_expired(&self, now_ms: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now_ms));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            self.stats
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Number of resident entries, fresh or stale
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            evictions: self.stats.evictions(),
            size: self.entries.len(),
            hit_rate: self.stats.hit_rate(),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total evictions
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}
