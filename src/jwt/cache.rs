//! Pluggable external cache for published key sets.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Byte cache with per-entry TTL backing the [`KeyStore`](super::KeyStore).
///
/// Implementations decide their own failure policy: a backend that cannot be
/// reached should report a miss from `get` and drop the write in `set`, which
/// makes the key store fall back to fetching from the publisher.
#[async_trait]
pub trait KeyCache: Send + Sync {
    /// Returns the cached bytes, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores bytes under `key` for at most `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process [`KeyCache`] that can be shared between key stores.
#[derive(Default)]
pub struct MemoryKeyCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryKeyCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries that have not expired yet.
    #[must_use]
    pub fn live_entries(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }
}

#[async_trait]
impl KeyCache for MemoryKeyCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }
}
