//! Keyed TTL cache with single-flight deduplication.
//!
//! Used by the custody coordinators to avoid redundant expensive reads
//! (member pool reads).
//!
//! ## Expiry
//!
//! Every entry carries an `expires_at`. A read at or after that instant is a
//! miss and the entry is dropped, so the next reader recomputes.
//!
//! ## Single-flight
//!
//! [`RecordCache::dedupe`] coalesces concurrent fetches of the same key: the
//! first caller runs the producer, every caller that arrives while it is in
//! flight waits on a broadcast channel and receives the same outcome.
//! Failures are broadcast but never cached.

pub mod coalesce;
pub mod keys;
pub mod store;

pub use keys::{CacheKey, CacheKeyClass};
pub use store::{CacheEntry, CacheStats, RecordCache};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors surfaced by the cache.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The producer for a deduplicated fetch failed
    #[error("Producer failed: {0}")]
    ProducerFailed(String),

    /// The caller running the producer went away before it finished
    #[error("In-flight fetch abandoned before completion")]
    Abandoned,
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache configuration.
///
/// TTLs are expressed per key class in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries before oldest-first eviction
    pub max_entries: usize,
    /// TTL for keys without a more specific class
    pub default_ttl_ms: u64,
    /// TTL for committee member pools
    pub member_pool_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl_ms: 60_000,        // 1 minute
            member_pool_ttl_ms: 300_000,   // 5 minutes
        }
    }
}

impl CacheConfig {
    /// Create config from environment or defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |name: &str, fallback: u64| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(fallback)
        };

        Self {
            max_entries: read("CUSTODY_CACHE_MAX_ENTRIES", defaults.max_entries as u64) as usize,
            default_ttl_ms: read("CUSTODY_CACHE_DEFAULT_TTL_MS", defaults.default_ttl_ms),
            member_pool_ttl_ms: read("CUSTODY_CACHE_MEMBER_POOL_TTL_MS", defaults.member_pool_ttl_ms),
        }
    }

    /// TTL applied to a key class.
    pub fn ttl_for(&self, class: CacheKeyClass) -> Duration {
        let millis = match class {
            CacheKeyClass::General => self.default_ttl_ms,
            CacheKeyClass::MemberPool => self.member_pool_ttl_ms,
        };
        Duration::from_millis(millis)
    }
}
