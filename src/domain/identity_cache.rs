//! Short-lived cache of resolved identity tuples.
//!
//! [`IdentityCache`] keeps the tuples resolved for a credential pair for a
//! fixed horizon so repeated telemetry from the same hub skips the bulk
//! lookup. It is an optimization only: a miss, an expired entry, or a
//! disabled cache must produce exactly the same ingestion outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::IdentityTuple;

#[derive(Debug)]
struct CachedIdentities {
    tuples: Arc<[IdentityTuple]>,
    stored_at: Instant,
}

/// TTL-bounded map from credential key to identity tuples.
///
/// # Concurrency
///
/// Guarded by a single [`RwLock`]: lookups share the lock, inserts and
/// invalidations take it exclusively.
#[derive(Debug)]
pub struct IdentityCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedIdentities>>,
}

impl IdentityCache {
    /// Creates an empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the configured time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached tuples for `key` unless missing or expired.
    pub async fn get(&self, key: &str) -> Option<Arc<[IdentityTuple]>> {
        let map = self.entries.read().await;
        map.get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.tuples))
    }

    /// Stores `tuples` under `key`. Empty sets are not cached.
    pub async fn insert(&self, key: String, tuples: Arc<[IdentityTuple]>) {
        if tuples.is_empty() {
            return;
        }
        let mut map = self.entries.write().await;
        map.insert(
            key,
            CachedIdentities {
                tuples,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops the entry for `key`, returning whether one existed.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Removes every expired entry, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut map = self.entries.write().await;
        let before = map.len();
        map.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        before - map.len()
    }

    /// Returns the number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
