//! [`DekCache`]: short-lived, per-process cache of unwrapped DEKs.
//!
//! Unwrapping a DEK costs a KMS round trip. A listing that decrypts fifty
//! contact fields for one organisation should pay for it once.
//!
//! Entries are keyed by `(org_id, generation, sha256(wrapped blob))`. The blob
//! digest means a re-wrapped or substituted blob can never be served a key
//! that was unwrapped from different material.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::Dek;

/// Default time-to-live for a cached DEK.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default upper bound on cached entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    org_id: String,
    generation: u32,
    blob_digest: [u8; 32],
}

impl CacheKey {
    fn new(org_id: &str, generation: u32, wrapped: &[u8]) -> Self {
        Self {
            org_id: org_id.to_owned(),
            generation,
            blob_digest: Sha256::digest(wrapped).into(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    dek: Dek,
    inserted_at: Instant,
}

/// Thread-safe TTL cache of unwrapped DEKs.
///
/// Cheap to clone; clones share the same underlying map.
#[derive(Clone, Debug)]
pub struct DekCache {
    inner: Arc<RwLock<HashMap<CacheKey, Entry>>>,
    ttl: Duration,
    max_entries: usize,
}

impl DekCache {
    /// Create an empty cache. A `max_entries` of zero disables caching.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            max_entries,
        }
    }

    /// A cache that never retains anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    /// Return a clone of the cached key, if present and unexpired.
    pub async fn get(&self, org_id: &str, generation: u32, wrapped: &[u8]) -> Option<Dek> {
        if self.max_entries == 0 {
            return None;
        }
        let key = CacheKey::new(org_id, generation, wrapped);
        let map = self.inner.read().await;
        map.get(&key)
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| e.dek.clone())
    }

    /// Cache `dek` as the unwrapped form of `wrapped`.
    ///
    /// Expired entries are evicted first; if the cache is still full the
    /// oldest entry makes room.
    pub async fn insert(&self, org_id: &str, generation: u32, wrapped: &[u8], dek: &Dek) {
        if self.max_entries == 0 || self.ttl.is_zero() {
            return;
        }
        let key = CacheKey::new(org_id, generation, wrapped);
        let mut map = self.inner.write().await;

        if map.len() >= self.max_entries && !map.contains_key(&key) {
            let ttl = self.ttl;
            map.retain(|_, e| e.inserted_at.elapsed() < ttl);
        }
        if map.len() >= self.max_entries && !map.contains_key(&key) {
            let oldest = map
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                map.remove(&oldest);
            }
        }

        map.insert(
            key,
            Entry {
                dek: dek.clone(),
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every cached key belonging to `org_id`.
    pub async fn invalidate_org(&self, org_id: &str) {
        self.inner.write().await.retain(|k, _| k.org_id != org_id);
    }

    /// Drop every cached key.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Evict expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, e| e.inserted_at.elapsed() < ttl);
        before - map.len()
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Returns `true` if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl Default for DekCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;

    fn dek(byte: u8) -> Dek {
        Dek::from_slice(&[byte; KEY_LEN]).unwrap()
    }

    #[tokio::test]
    async fn initially_empty() {
        let cache = DekCache::default();
        assert!(cache.is_empty().await);
        assert!(cache.get("org_1", 1, b"blob").await.is_none());
    }

    #[tokio::test]
    async fn insert_and_get() {
        let cache = DekCache::default();
        cache.insert("org_1", 1, b"blob", &dek(0x42)).await;
        let hit = cache.get("org_1", 1, b"blob").await.unwrap();
        assert_eq!(hit.as_bytes(), &[0x42; KEY_LEN]);
    }

    #[tokio::test]
    async fn key_is_scoped_to_org_generation_and_blob() {
        let cache = DekCache::default();
        cache.insert("org_1", 1, b"blob", &dek(0x01)).await;
        assert!(cache.get("org_2", 1, b"blob").await.is_none());
        assert!(cache.get("org_1", 2, b"blob").await.is_none());
        assert!(cache.get("org_1", 1, b"other blob").await.is_none());
    }

    #[tokio::test]
    async fn zero_ttl_never_serves() {
        let cache = DekCache::new(Duration::ZERO, 16);
        cache.insert("org_1", 1, b"blob", &dek(0x01)).await;
        assert!(cache.get("org_1", 1, b"blob").await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_holds_nothing() {
        let cache = DekCache::disabled();
        cache.insert("org_1", 1, b"blob", &dek(0x01)).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn invalidate_org_only_touches_that_org() {
        let cache = DekCache::default();
        cache.insert("org_1", 1, b"a", &dek(0x01)).await;
        cache.insert("org_1", 2, b"b", &dek(0x02)).await;
        cache.insert("org_2", 1, b"c", &dek(0x03)).await;
        cache.invalidate_org("org_1").await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("org_2", 1, b"c").await.is_some());
    }

    #[tokio::test]
    async fn full_cache_evicts_oldest() {
        let cache = DekCache::new(DEFAULT_TTL, 2);
        cache.insert("org_1", 1, b"a", &dek(0x01)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.insert("org_2", 1, b"b", &dek(0x02)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.insert("org_3", 1, b"c", &dek(0x03)).await;
        assert_eq!(cache.len().await, 2);
        assert!(cache.get("org_1", 1, b"a").await.is_none());
        assert!(cache.get("org_3", 1, b"c").await.is_some());
    }

    #[tokio::test]
    async fn purge_removes_expired_entries() {
        let cache = DekCache::new(Duration::from_millis(10), 16);
        cache.insert("org_1", 1, b"a", &dek(0x01)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert!(cache.is_empty().await);
    }
}
