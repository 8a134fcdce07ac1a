//! Distributed cache on Redis
//!
//! Expiry is delegated to Redis (`PX`). Remote failures never reach the
//! caller: reads degrade to a miss and writes are dropped, both with a
//! warning.

use crate::cache::CacheBackend;
use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use crate::storage::redis::expiry_millis;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bound on every round trip to the cache server
const CACHE_CALL_TIMEOUT: Duration = Duration::from_millis(500);

/// Keys removed per `DEL` while clearing
const CLEAR_BATCH: usize = 500;

/// Redis cache implementation
pub struct RedisCache {
    connection_manager: ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    /// Connect to the cache server at `url`, namespacing keys under `key_prefix`
    pub async fn new(url: &str, key_prefix: &str) -> SchemaRegistryResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            SchemaRegistryError::cache(&format!("Failed to create Redis client: {}", e))
        })?;
        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            SchemaRegistryError::cache(&format!("Failed to connect to Redis cache: {}", e))
        })?;

        Ok(Self {
            connection_manager,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn call<T, Fut>(&self, operation: &str, call: Fut) -> SchemaRegistryResult<T>
    where
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(CACHE_CALL_TIMEOUT, call).await {
            Ok(result) => result.map_err(|e| {
                SchemaRegistryError::cache(&format!("{} failed: {}", operation, e))
            }),
            Err(_) => Err(SchemaRegistryError::cache(&format!(
                "{} timed out after {:?}",
                operation, CACHE_CALL_TIMEOUT
            ))),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> SchemaRegistryResult<Option<Vec<u8>>> {
        let mut conn = self.connection_manager.clone();
        let cmd = redis::cmd("GET").arg(self.cache_key(key)).clone();

        match self
            .call("cache get", cmd.query_async::<_, Option<Vec<u8>>>(&mut conn))
            .await
        {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Distributed cache read failed, treating as miss");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SchemaRegistryResult<()> {
        let mut conn = self.connection_manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.cache_key(key)).arg(value);
        // a zero TTL stores without expiry
        if let Some(ms) = expiry_millis(ttl) {
            cmd.arg("PX").arg(ms);
        }

        if let Err(e) = self.call("cache set", cmd.query_async::<_, ()>(&mut conn)).await {
            warn!(key = %key, error = %e, "Distributed cache write dropped");
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> SchemaRegistryResult<()> {
        let mut conn = self.connection_manager.clone();
        let cmd = redis::cmd("DEL").arg(self.cache_key(key)).clone();

        if let Err(e) = self.call("cache delete", cmd.query_async::<_, ()>(&mut conn)).await {
            warn!(key = %key, error = %e, "Distributed cache delete failed");
        }
        Ok(())
    }

    async fn clear(&self) -> SchemaRegistryResult<()> {
        let mut conn = self.connection_manager.clone();
        let pattern = format!("{}*", self.key_prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let scan = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(CLEAR_BATCH)
                .clone();
            let (next, keys): (u64, Vec<String>) = match self
                .call("cache scan", scan.query_async(&mut conn))
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "Distributed cache clear aborted");
                    return Ok(());
                }
            };

            if !keys.is_empty() {
                removed += keys.len();
                let del = redis::cmd("DEL").arg(&keys).clone();
                if let Err(e) = self.call("cache clear", del.query_async::<_, ()>(&mut conn)).await {
                    warn!(error = %e, "Distributed cache clear aborted");
                    return Ok(());
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(removed, prefix = %self.key_prefix, "Cleared distributed cache");
        Ok(())
    }

    async fn health(&self) -> SchemaRegistryResult<()> {
        let mut conn = self.connection_manager.clone();
        let pong: String = self
            .call("cache ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        if pong.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(SchemaRegistryError::cache(&format!(
                "unexpected PING reply: {}",
                pong
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn cache() -> Option<RedisCache> {
        let url = std::env::var("FORM_SCHEMA_REGISTRY_TEST_REDIS_URL").ok()?;
        let prefix = format!("test_cache:{}:", uuid::Uuid::new_v4().simple());
        Some(RedisCache::new(&url, &prefix).await.unwrap())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_round_trip_and_clear() {
        let Some(cache) = cache().await else {
            return;
        };
        cache.health().await.unwrap();

        cache
            .set("schema:a", b"1".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("schema:a").await.unwrap(), Some(b"1".to_vec()));

        cache.clear().await.unwrap();
        assert_eq!(cache.get("schema:a").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_expiry_is_remote() {
        let Some(cache) = cache().await else {
            return;
        };
        cache
            .set("schema:b", b"1".to_vec(), Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get("schema:b").await.unwrap(), None);
    }
}
