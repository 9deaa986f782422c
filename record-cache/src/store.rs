//! Cache store implementation
//!
//! In-memory keyed cache with per-entry TTL and prefix invalidation.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::keys::CacheKey;
use crate::{CacheConfig, Result};

/// A cached value with expiry metadata
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value
    pub value: T,
    /// When this entry was created
    pub created_at: Instant,
    /// When this entry expires
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Create a new cache entry
    pub fn new(value: T, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check if this entry has expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Remaining time to live
    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Producer executions started by `dedupe`
    pub producer_runs: u64,
    /// Callers that joined an existing in-flight fetch
    pub coalesced: u64,
}

impl CacheStats {
    /// Calculate hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Keyed TTL cache.
///
/// Shared by reference (typically behind an `Arc`); every method takes
/// `&self`.
pub struct RecordCache<T> {
    /// The cache storage: storage_key -> entry
    pub(crate) entries: DashMap<String, CacheEntry<T>>,
    /// Fetches currently running under `dedupe` (storage_key -> result channel)
    pub(crate) in_flight: DashMap<String, broadcast::Sender<Result<T>>>,
    /// Configuration
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    pub(crate) producer_runs: AtomicU64,
    pub(crate) coalesced: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> RecordCache<T> {
    /// Create a new cache with configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            producer_runs: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Get a value. Missing and expired entries both read as `None`.
    pub fn get(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache hit");
                return Some(entry.value.clone());
            }
            // Release the shard guard before removing
            drop(entry);
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = key, "Cache miss");
        None
    }

    /// Get by typed key
    pub fn get_key(&self, key: &CacheKey) -> Option<T> {
        self.get(&key.to_storage_key())
    }

    /// Store a value with an explicit TTL
    pub fn set(&self, key: &str, value: T, ttl: Duration) {
        debug!(key = key, ttl_ms = ttl.as_millis() as u64, "Cache set");
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        self.maybe_evict();
    }

    /// Store by typed key, using the TTL configured for its class
    pub fn set_key(&self, key: &CacheKey, value: T) {
        self.set(&key.to_storage_key(), value, self.config.ttl_for(key.class));
    }

    /// Remove an entry, returning its value if it was still live
    pub fn delete(&self, key: &str) -> Option<T> {
        self.entries
            .remove(key)
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(_, entry)| entry.value)
    }

    /// Invalidate entries matching a prefix
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(pattern));
        let count = before.saturating_sub(self.entries.len());

        if count > 0 {
            debug!(pattern = pattern, count = count, "Invalidated cache entries");
        }
        count
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.clear();
        info!("Cache cleared");
    }

    /// Remove expired entries
    pub fn cleanup(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let count = before.saturating_sub(self.entries.len());

        if count > 0 {
            debug!(count = count, "Cleaned up expired cache entries");
        }
        count
    }

    /// Number of fetches currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            producer_runs: self.producer_runs.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Evict entries if over capacity (expired first, then oldest)
    fn maybe_evict(&self) {
        if self.entries.len() <= self.config.max_entries {
            return;
        }

        self.cleanup();
        if self.entries.len() <= self.config.max_entries {
            return;
        }

        let to_evict = self.entries.len() - self.config.max_entries;
        let mut by_age: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.created_at))
            .collect();
        by_age.sort_by_key(|(_, created)| *created);

        for (key, _) in by_age.into_iter().take(to_evict) {
            self.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        debug!(evicted = to_evict, "Evicted cache entries");
    }
}

impl<T: Clone + Send + Sync + 'static> Default for RecordCache<T> {
    fn default() -> Self {
        Self::with_defaults()
    }
}
