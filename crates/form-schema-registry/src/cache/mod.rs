//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Cache backends for the schema registry
//!
//! Caches hold encoded (and transformed) bytes under the keys produced by
//! [`crate::schema::current_cache_key`] and [`crate::schema::version_cache_key`].
//! They are never authoritative: the registry treats every error as a miss.

pub mod memory;
pub mod redis;
pub mod tiered;

use crate::config::CacheConfig;
use crate::error::SchemaRegistryResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use memory::{CacheStats, MemoryCache};
pub use redis::RedisCache;
pub use tiered::TieredCache;

/// Cache backend trait
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Look up a key; expired entries are misses
    async fn get(&self, key: &str) -> SchemaRegistryResult<Option<Vec<u8>>>;

    /// Store bytes under a key for `ttl`
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SchemaRegistryResult<()>;

    /// Remove a key; removing an absent key succeeds
    async fn delete(&self, key: &str) -> SchemaRegistryResult<()>;

    /// Remove every entry owned by this cache
    async fn clear(&self) -> SchemaRegistryResult<()>;

    /// Probe the cache
    async fn health(&self) -> SchemaRegistryResult<()>;

    /// In-process statistics, when the backend keeps any
    async fn stats(&self) -> Option<CacheStats> {
        None
    }
}

/// Build the cache stack described by the configuration
///
/// Returns `None` when both tiers are disabled. A distributed tier that
/// cannot be reached at startup is logged and left out rather than failing
/// construction.
pub async fn create_cache_backend(config: &CacheConfig) -> Option<Arc<dyn CacheBackend>> {
    let near: Option<Arc<dyn CacheBackend>> = if config.enable_memory_cache {
        Some(Arc::new(MemoryCache::new(
            config.max_memory_cache_size,
            config.eviction_policy,
            Duration::from_secs(config.sweep_interval_secs),
        )))
    } else {
        None
    };

    let far: Option<Arc<dyn CacheBackend>> = match (
        config.enable_distributed_cache,
        config.distributed_cache_url.as_deref(),
    ) {
        (true, Some(url)) => match RedisCache::new(url, &config.distributed_cache_prefix).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!(error = %e, "Distributed cache unavailable, continuing without it");
                None
            }
        },
        _ => None,
    };

    match (near, far) {
        (Some(near), Some(far)) => {
            info!("Using tiered schema cache");
            Some(Arc::new(TieredCache::new(
                near,
                far,
                config.memory_cache_ttl(),
                config.distributed_cache_ttl(),
            )))
        }
        (Some(near), None) => Some(near),
        (None, Some(far)) => Some(far),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_respects_flags() {
        let config = CacheConfig::default();
        let cache = create_cache_backend(&config).await.unwrap();
        assert_eq!(cache.name(), "memory");

        let disabled = CacheConfig {
            enable_memory_cache: false,
            ..CacheConfig::default()
        };
        assert!(create_cache_backend(&disabled).await.is_none());
    }

    #[tokio::test]
    async fn test_factory_without_url_skips_distributed_tier() {
        let config = CacheConfig {
            enable_distributed_cache: true,
            distributed_cache_url: None,
            ..CacheConfig::default()
        };
        let cache = create_cache_backend(&config).await.unwrap();
        assert_eq!(cache.name(), "memory");
    }
}
