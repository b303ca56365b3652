// src/cache/mod.rs
//! Verdict and profile caching
//!
//! Entries are overwritten last-write-wins and never invalidated explicitly;
//! they simply expire. Values travel through [`CachingService`] as bincode
//! bytes so any byte-oriented store can back the engines.

use crate::repository::CachingService;
use crate::{EngineError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Key of a cached risk assessment
pub fn risk_cache_key(user_id: &str, tenant_id: &str, operation_type: &str) -> String {
    format!("risk:{}:{}:{}", tenant_id, user_id, operation_type)
}

/// Key of a cached user risk profile
pub fn profile_cache_key(user_id: &str, tenant_id: &str) -> String {
    format!("user_profile:{}:{}", tenant_id, user_id)
}

/// Fetch and decode a value; undecodable entries are treated as misses
pub async fn get_typed<T>(cache: &dyn CachingService, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    match cache.get(key).await? {
        Some(bytes) => match bincode::deserialize(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Encode and store a value
pub async fn set_typed<T>(
    cache: &dyn CachingService,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let bytes = bincode::serialize(value).map_err(|e| EngineError::Serialization(e.to_string()))?;
    cache.set(key, bytes, ttl).await
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Writes between two full sweeps of expired entries
pub const DEFAULT_SWEEP_INTERVAL: u64 = 1024;

/// Process-local TTL cache backed by a concurrent map.
///
/// Expired entries are dropped lazily on read and swept from the whole map
/// every [`DEFAULT_SWEEP_INTERVAL`] writes; [`MemoryCache::purge_expired`]
/// sweeps on demand.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    writes: AtomicU64,
    sweep_interval: u64,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            writes: AtomicU64::new(0),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep expired entries every `interval` writes (at least 1)
    pub fn with_sweep_interval(mut self, interval: u64) -> Self {
        self.sweep_interval = interval.max(1);
        self
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CachingService for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.data.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 3600));
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                expires_at,
            },
        );

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.sweep_interval == 0 {
            let purged = self.purge_expired();
            if purged > 0 {
                let remaining = self.entries.len();
                tracing::debug!(purged, remaining, "swept expired cache entries");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserRiskProfile;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = MemoryCache::new();
        cache.set("k", vec![1, 2, 3], Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = MemoryCache::new();
        cache.set("k", vec![1], Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = MemoryCache::new();
        cache.set("k", vec![1], Duration::from_secs(60)).await.unwrap();
        cache.set("k", vec![2], Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(vec![2]));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.set("old", vec![1], Duration::ZERO).await.unwrap();
        cache.set("new", vec![2], Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_typed_round_trip_and_corrupt_entry() {
        let cache = MemoryCache::new();
        let profile = UserRiskProfile::neutral("u1", "acme");
        let key = profile_cache_key("u1", "acme");
        set_typed(&cache, &key, &profile, Duration::from_secs(60)).await.unwrap();
        let loaded: Option<UserRiskProfile> = get_typed(&cache, &key).await.unwrap();
        assert_eq!(loaded, Some(profile));

        cache.set(&key, vec![0xff], Duration::from_secs(60)).await.unwrap();
        let corrupt: Option<UserRiskProfile> = get_typed(&cache, &key).await.unwrap();
        assert_eq!(corrupt, None);
    }

    #[test]
    fn test_keys_are_scoped() {
        assert_ne!(risk_cache_key("u1", "acme", "LOGIN"), risk_cache_key("u1", "globex", "LOGIN"));
        assert_ne!(risk_cache_key("u1", "acme", "LOGIN"), risk_cache_key("u1", "acme", "TRANSFER"));
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_entries() {
        let cache = MemoryCache::new().with_sweep_interval(10);
        for i in 0..9 {
            cache.set(&format!("old-{}", i), vec![1], Duration::ZERO).await.unwrap();
        }
        assert_eq!(cache.len(), 9);

        cache.set("fresh", vec![2], Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh").await.unwrap(), Some(vec![2]));
    }
}
