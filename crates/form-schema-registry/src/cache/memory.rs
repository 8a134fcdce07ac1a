//! In-process cache implementation

use crate::cache::CacheBackend;
use crate::config::EvictionPolicy;
use crate::error::SchemaRegistryResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Live entries, including expired ones not yet reclaimed
    pub entries: usize,

    /// Lookups served from the cache
    pub hits: u64,

    /// Lookups that found nothing or an expired entry
    pub misses: u64,

    /// Entries removed to make room
    pub evictions: u64,

    /// Entries reclaimed after expiry
    pub expired: u64,
}

#[derive(Debug)]
struct CacheEntry {
    value: Vec<u8>,
    /// `None` when the TTL reaches past the clock's range
    expires_at: Option<Instant>,
    last_access: Instant,
    hits: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl CacheState {
    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let reclaimed = before - self.entries.len();
        self.stats.expired += reclaimed as u64;
        reclaimed
    }

    /// Pick the entry to drop when the cache is full
    fn victim(&self, policy: EvictionPolicy, now: Instant) -> Option<String> {
        if let Some((key, _)) = self.entries.iter().find(|(_, e)| e.is_expired(now)) {
            return Some(key.clone());
        }

        let entries = self.entries.iter();
        let chosen = match policy {
            EvictionPolicy::Lru => entries.min_by_key(|(_, e)| e.last_access),
            EvictionPolicy::Lfu => entries.min_by_key(|(_, e)| (e.hits, e.last_access)),
            EvictionPolicy::Ttl => {
                entries.min_by_key(|(_, e)| (e.expires_at.is_none(), e.expires_at))
            }
        };
        chosen.map(|(key, _)| key.clone())
    }
}

/// Bounded in-process cache with LRU, LFU or TTL eviction
pub struct MemoryCache {
    state: Arc<Mutex<CacheState>>,
    max_entries: usize,
    policy: EvictionPolicy,
    sweeper: Option<JoinHandle<()>>,
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries`
    ///
    /// A non-zero `sweep_interval` starts a background task that reclaims
    /// expired entries; it needs a running tokio runtime and stops when the
    /// cache is dropped. Without one, expired entries are reclaimed lazily.
    pub fn new(max_entries: usize, policy: EvictionPolicy, sweep_interval: Duration) -> Self {
        let state = Arc::new(Mutex::new(CacheState::default()));

        let sweeper = if sweep_interval.is_zero() {
            None
        } else {
            tokio::runtime::Handle::try_current()
                .ok()
                .map(|handle| handle.spawn(sweep(Arc::downgrade(&state), sweep_interval)))
        };

        Self {
            state,
            max_entries: max_entries.max(1),
            policy,
            sweeper,
        }
    }

    /// Current statistics
    pub async fn snapshot(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }

    /// Reclaim expired entries now, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        self.state.lock().await.purge_expired(Instant::now())
    }
}

async fn sweep(state: Weak<Mutex<CacheState>>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // the first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(state) = state.upgrade() else {
            break;
        };
        let reclaimed = state.lock().await.purge_expired(Instant::now());
        if reclaimed > 0 {
            debug!(reclaimed, "Swept expired cache entries");
        }
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> SchemaRegistryResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let expired = match state.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_access = now;
                entry.hits += 1;
                let value = entry.value.clone();
                state.stats.hits += 1;
                return Ok(Some(value));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(key);
            state.stats.expired += 1;
        }
        state.stats.misses += 1;
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SchemaRegistryResult<()> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        if !state.entries.contains_key(key) {
            while state.entries.len() >= self.max_entries {
                let Some(victim) = state.victim(self.policy, now) else {
                    break;
                };
                let expired = state
                    .entries
                    .remove(&victim)
                    .is_some_and(|e| e.is_expired(now));
                if expired {
                    state.stats.expired += 1;
                } else {
                    state.stats.evictions += 1;
                }
            }
        }

        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now.checked_add(ttl),
                last_access: now,
                hits: 0,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> SchemaRegistryResult<()> {
        self.state.lock().await.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> SchemaRegistryResult<()> {
        self.state.lock().await.entries.clear();
        Ok(())
    }

    async fn health(&self) -> SchemaRegistryResult<()> {
        Ok(())
    }

    async fn stats(&self) -> Option<CacheStats> {
        Some(self.snapshot().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn cache(size: usize, policy: EvictionPolicy) -> MemoryCache {
        MemoryCache::new(size, policy, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_get_set_delete() {
        let cache = cache(10, EvictionPolicy::Lru);

        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.set("k", b"v".to_vec(), MINUTE).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);

        let stats = cache.snapshot().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_misses() {
        let cache = cache(10, EvictionPolicy::Lru);
        cache.set("k", b"v".to_vec(), Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        let stats = cache.snapshot().await;
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.expired, 1);
    }

    #[tokio::test]
    async fn test_lru_evicts_least_recently_used() {
        let cache = cache(2, EvictionPolicy::Lru);
        cache.set("a", b"1".to_vec(), MINUTE).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set("b", b"2".to_vec(), MINUTE).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;

        cache.get("a").await.unwrap();
        cache.set("c", b"3".to_vec(), MINUTE).await.unwrap();

        assert!(cache.get("a").await.unwrap().is_some());
        assert!(cache.get("b").await.unwrap().is_none());
        assert!(cache.get("c").await.unwrap().is_some());
        assert_eq!(cache.snapshot().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_lfu_evicts_least_frequently_used() {
        let cache = cache(2, EvictionPolicy::Lfu);
        cache.set("a", b"1".to_vec(), MINUTE).await.unwrap();
        cache.set("b", b"2".to_vec(), MINUTE).await.unwrap();

        for _ in 0..3 {
            cache.get("b").await.unwrap();
        }
        cache.get("a").await.unwrap();

        cache.set("c", b"3".to_vec(), MINUTE).await.unwrap();
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ttl_evicts_soonest_expiry() {
        let cache = cache(2, EvictionPolicy::Ttl);
        cache.set("long", b"1".to_vec(), MINUTE * 10).await.unwrap();
        cache.set("short", b"2".to_vec(), MINUTE).await.unwrap();

        cache.set("new", b"3".to_vec(), MINUTE * 5).await.unwrap();
        assert!(cache.get("short").await.unwrap().is_none());
        assert!(cache.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = cache(1, EvictionPolicy::Lru);
        cache.set("a", b"1".to_vec(), MINUTE).await.unwrap();
        cache.set("a", b"2".to_vec(), MINUTE).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(cache.snapshot().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let cache = cache(10, EvictionPolicy::Lru);
        cache.set("a", b"1".to_vec(), MINUTE).await.unwrap();
        cache.clear().await.unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.snapshot().await.entries, 0);
    }

    #[tokio::test]
    async fn test_unbounded_ttl_never_expires() {
        let cache = cache(10, EvictionPolicy::Lru);
        cache
            .set("forever", b"1".to_vec(), Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        cache.set("max", b"2".to_vec(), Duration::MAX).await.unwrap();

        assert_eq!(cache.get("forever").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(cache.get("max").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(cache.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn test_ttl_eviction_prefers_bounded_entries() {
        let cache = cache(2, EvictionPolicy::Ttl);
        cache
            .set("forever", b"1".to_vec(), Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        cache.set("bounded", b"2".to_vec(), MINUTE * 10).await.unwrap();

        cache.set("new", b"3".to_vec(), MINUTE).await.unwrap();
        assert!(cache.get("bounded").await.unwrap().is_none());
        assert!(cache.get("forever").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_reclaims_expired() {
        let cache = MemoryCache::new(10, EvictionPolicy::Lru, Duration::from_secs(1));
        cache.set("a", b"1".to_vec(), Duration::from_millis(500)).await.unwrap();
        cache.set("b", b"2".to_vec(), MINUTE).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let stats = cache.snapshot().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.expired, 1);
    }
}
