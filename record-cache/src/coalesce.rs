//! Request coalescing (single-flight) for cache fills.
//!
//! When several callers miss on the same key at once, only the first runs
//! the producer. The rest subscribe to its broadcast channel and receive the
//! same outcome. Registration, cache lookup, and completion all happen under
//! the in-flight shard lock for the key, so a caller either joins the flight
//! before it completes or finds the cached value afterward.

use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::keys::CacheKey;
use crate::store::RecordCache;
use crate::{CacheError, Result};

enum Role<T> {
    Leader(broadcast::Sender<Result<T>>),
    Waiter(broadcast::Receiver<Result<T>>),
}

/// Clears the in-flight marker if the leader is dropped mid-fetch.
struct FlightGuard<'a, T: Clone + Send + Sync + 'static> {
    cache: &'a RecordCache<T>,
    key: &'a str,
    sender: Option<broadcast::Sender<Result<T>>>,
}

impl<T: Clone + Send + Sync + 'static> FlightGuard<'_, T> {
    fn complete(mut self, outcome: Result<T>, ttl: Duration) -> Result<T> {
        let Some(sender) = self.sender.take() else {
            return outcome;
        };

        // Cache before removing the marker so late callers find the value.
        if let Ok(value) = &outcome {
            self.cache.set(self.key, value.clone(), ttl);
        }
        self.cache
            .in_flight
            .remove_if(self.key, |_, registered| registered.same_channel(&sender));

        let waiting = sender.receiver_count();
        debug!(
            key = self.key,
            waiting = waiting,
            success = outcome.is_ok(),
            "Completing coalesced fetch"
        );
        // Receivers may have dropped; nothing to do about it.
        let _ = sender.send(outcome.clone());
        outcome
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            warn!(key = self.key, "In-flight fetch abandoned");
            self.cache
                .in_flight
                .remove_if(self.key, |_, registered| registered.same_channel(&sender));
            // Dropping the sender closes the channel; waiters see `Abandoned`.
        }
    }
}

impl<T: Clone + Send + Sync + 'static> RecordCache<T> {
    /// Return the cached value for `key`, or run `producer` exactly once
    /// across all concurrent callers and cache its result for `ttl`.
    ///
    /// A producer failure is delivered to every waiter as
    /// [`CacheError::ProducerFailed`] and nothing is cached.
    pub async fn dedupe<F, Fut, E>(&self, key: &str, ttl: Duration, producer: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let role = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(flight) => Role::Waiter(flight.get().subscribe()),
            Entry::Vacant(slot) => {
                if let Some(value) = self.get(key) {
                    return Ok(value);
                }
                let (sender, _) = broadcast::channel(1);
                slot.insert(sender.clone());
                Role::Leader(sender)
            }
        };

        match role {
            Role::Waiter(mut receiver) => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Joined in-flight fetch");
                receiver.recv().await.unwrap_or(Err(CacheError::Abandoned))
            }
            Role::Leader(sender) => {
                self.producer_runs.fetch_add(1, Ordering::Relaxed);
                let guard = FlightGuard {
                    cache: self,
                    key,
                    sender: Some(sender),
                };
                let outcome = producer().await.map_err(|e| {
                    debug!(key = key, error = %e, "Producer failed");
                    CacheError::ProducerFailed(e.to_string())
                });
                guard.complete(outcome, ttl)
            }
        }
    }

    /// [`dedupe`](Self::dedupe) by typed key, using its class TTL.
    pub async fn dedupe_key<F, Fut, E>(&self, key: &CacheKey, producer: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let ttl = self.config().ttl_for(key.class);
        self.dedupe(&key.to_storage_key(), ttl, producer).await
    }
}
