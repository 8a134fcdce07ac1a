//! Two-tier cache: in-process in front of distributed

use crate::cache::{CacheBackend, CacheStats};
use crate::error::SchemaRegistryResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Near tier consulted first, far tier back-filling it
pub struct TieredCache {
    near: Arc<dyn CacheBackend>,
    far: Arc<dyn CacheBackend>,
    backfill_ttl: Duration,
    far_ttl: Duration,
}

impl TieredCache {
    /// Combine two tiers
    ///
    /// The far tier always stores with `far_ttl`; entries copied into the
    /// near tier after a far hit live for `backfill_ttl`.
    pub fn new(
        near: Arc<dyn CacheBackend>,
        far: Arc<dyn CacheBackend>,
        backfill_ttl: Duration,
        far_ttl: Duration,
    ) -> Self {
        Self {
            near,
            far,
            backfill_ttl,
            far_ttl,
        }
    }
}

#[async_trait]
impl CacheBackend for TieredCache {
    fn name(&self) -> &'static str {
        "tiered"
    }

    async fn get(&self, key: &str) -> SchemaRegistryResult<Option<Vec<u8>>> {
        match self.near.get(key).await {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {}
            Err(e) => warn!(key = %key, tier = self.near.name(), error = %e, "Cache tier read failed"),
        }

        let Some(value) = self.far.get(key).await? else {
            return Ok(None);
        };

        let ttl = self.backfill_ttl.min(self.far_ttl);
        if let Err(e) = self.near.set(key, value.clone(), ttl).await {
            warn!(key = %key, tier = self.near.name(), error = %e, "Cache back-fill failed");
        }
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SchemaRegistryResult<()> {
        let near = self.near.set(key, value.clone(), ttl).await;
        let far = self.far.set(key, value, self.far_ttl).await;
        near.and(far)
    }

    async fn delete(&self, key: &str) -> SchemaRegistryResult<()> {
        let near = self.near.delete(key).await;
        let far = self.far.delete(key).await;
        near.and(far)
    }

    async fn clear(&self) -> SchemaRegistryResult<()> {
        let near = self.near.clear().await;
        let far = self.far.clear().await;
        near.and(far)
    }

    async fn health(&self) -> SchemaRegistryResult<()> {
        self.near.health().await?;
        self.far.health().await
    }

    async fn stats(&self) -> Option<CacheStats> {
        self.near.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::EvictionPolicy;

    fn tier() -> Arc<MemoryCache> {
        Arc::new(MemoryCache::new(16, EvictionPolicy::Lru, Duration::ZERO))
    }

    #[tokio::test]
    async fn test_far_hit_back_fills_near() {
        let near = tier();
        let far = tier();
        let cache = TieredCache::new(
            near.clone(),
            far.clone(),
            Duration::from_secs(30),
            Duration::from_secs(60),
        );

        far.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(near.get("k").await.unwrap(), None);

        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(near.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_back_fill_with_unbounded_ttls() {
        let near = tier();
        let far = tier();
        let forever = Duration::from_secs(u64::MAX);
        let cache = TieredCache::new(near.clone(), far.clone(), forever, forever);

        far.set("k", b"v".to_vec(), forever).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(near.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_writes_and_deletes_reach_both_tiers() {
        let near = tier();
        let far = tier();
        let cache = TieredCache::new(
            near.clone(),
            far.clone(),
            Duration::from_secs(30),
            Duration::from_secs(60),
        );

        cache.set("k", b"v".to_vec(), Duration::from_secs(5)).await.unwrap();
        assert!(near.get("k").await.unwrap().is_some());
        assert!(far.get("k").await.unwrap().is_some());

        cache.delete("k").await.unwrap();
        assert!(near.get("k").await.unwrap().is_none());
        assert!(far.get("k").await.unwrap().is_none());
    }
}
