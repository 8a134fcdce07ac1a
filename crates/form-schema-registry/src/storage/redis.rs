//! Redis storage implementation
//!
//! Key layout, all under the configured prefix:
//!
//! ```text
//! <prefix><id>                    current bytes
//! <prefix>meta:<id>               hash: size, created_at, updated_at, access_count, last_access
//! <prefix>index:all               set of live ids
//! <prefix>versions:<id>           sorted set of version tags, scored by sequence
//! <prefix>version:<id>:<tag>      archived bytes
//! <prefix>version_seq:<id>        per-id counter the tags are derived from
//! ```
//!
//! Ids never contain ':', so record keys cannot collide with the
//! auxiliary keys. Version tags come from a per-id `INCR` counter rather
//! than the wall clock, which keeps them unique across processes.
//!
//! With a record TTL every key of an id expires together with the record.
//! The index set cannot expire per member; `list` drops ids whose record
//! is gone and removes them from the index.

use crate::config::{RedisSettings, StorageBackendType};
use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use crate::storage::batch::{fan_out, DEFAULT_BATCH_CONCURRENCY};
use crate::storage::retry::RetryPolicy;
use crate::storage::versioning::format_version_tag;
use crate::storage::{
    apply_filter, ensure_active, ensure_non_empty, StorageBackend, StorageError, StorageFilter,
    StorageMetadata, VersionPolicy, HEALTH_PROBE_TIMEOUT,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::FromRedisValue;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Largest `PX` argument; the server rejects expiries past `i64` milliseconds
const MAX_EXPIRY_MS: u64 = i64::MAX as u64 / 2;

/// `PX` argument for a TTL, `None` for a zero TTL
pub(crate) fn expiry_millis(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        return None;
    }
    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    Some(millis.clamp(1, MAX_EXPIRY_MS))
}

/// Split indexed ids into those whose record exists and those that are gone
fn partition_live(ids: Vec<String>, exists: &[u64]) -> (Vec<String>, Vec<String>) {
    let (live, stale): (Vec<_>, Vec<_>) = ids
        .into_iter()
        .zip(exists.iter().copied().chain(std::iter::repeat(0)))
        .partition(|(_, count)| *count > 0);
    (
        live.into_iter().map(|(id, _)| id).collect(),
        stale.into_iter().map(|(id, _)| id).collect(),
    )
}

/// Redis storage implementation
pub struct RedisStorage {
    /// Redis connection manager
    connection_manager: redis::aio::ConnectionManager,

    /// Key prefix for schema storage
    key_prefix: String,

    /// Expiry of current records
    ttl: Option<Duration>,

    /// Retention policy
    policy: VersionPolicy,

    /// Retry policy for primitive calls
    retry: RetryPolicy,

    /// Worker bound for batch fan-out
    batch_concurrency: usize,
}

impl RedisStorage {
    /// Create a new Redis storage instance
    pub async fn new(
        settings: &RedisSettings,
        policy: VersionPolicy,
        retry: RetryPolicy,
    ) -> SchemaRegistryResult<Self> {
        let client = redis::Client::open(settings.url.as_str()).map_err(|e| {
            StorageError::ConfigurationError {
                message: format!("Failed to create Redis client: {}", e),
            }
        })?;

        let connection_manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: format!("Failed to create Redis connection manager: {}", e),
            })?;

        Ok(Self {
            connection_manager,
            key_prefix: settings.key_prefix.clone(),
            ttl: settings.ttl,
            policy,
            retry,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        })
    }

    /// Set the worker bound for batch operations
    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    /// Generate Redis key for a record
    fn record_key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// Generate Redis key for record metadata
    fn metadata_key(&self, id: &str) -> String {
        format!("{}meta:{}", self.key_prefix, id)
    }

    /// Generate Redis key for the id index
    fn index_key(&self) -> String {
        format!("{}index:all", self.key_prefix)
    }

    /// Generate Redis key for the version tag set
    fn versions_key(&self, id: &str) -> String {
        format!("{}versions:{}", self.key_prefix, id)
    }

    /// Generate Redis key for archived bytes
    fn version_key(&self, id: &str, version: &str) -> String {
        format!("{}version:{}:{}", self.key_prefix, id, version)
    }

    /// Generate Redis key for the version counter
    fn sequence_key(&self, id: &str) -> String {
        format!("{}version_seq:{}", self.key_prefix, id)
    }

    async fn query<T>(
        &self,
        operation: &str,
        policy: RetryPolicy,
        cmd: &redis::Cmd,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<T>
    where
        T: FromRedisValue + Send,
    {
        policy
            .run(operation, cancel, || {
                let mut conn = self.connection_manager.clone();
                let cmd = cmd.clone();
                async move { Ok(cmd.query_async::<_, T>(&mut conn).await?) }
            })
            .await
    }

    async fn query_pipe<T>(
        &self,
        operation: &str,
        pipe: &redis::Pipeline,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<T>
    where
        T: FromRedisValue + Send,
    {
        self.retry
            .run(operation, cancel, || {
                let mut conn = self.connection_manager.clone();
                let pipe = pipe.clone();
                async move { Ok(pipe.query_async::<_, T>(&mut conn).await?) }
            })
            .await
    }

    async fn execute(
        &self,
        operation: &str,
        pipe: &redis::Pipeline,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        self.retry
            .single_attempt()
            .run(operation, cancel, || {
                let mut conn = self.connection_manager.clone();
                let pipe = pipe.clone();
                async move {
                    pipe.query_async::<_, ()>(&mut conn).await.map_err(|e| {
                        SchemaRegistryError::from(StorageError::TransactionError {
                            message: format!("{} transaction failed: {}", operation, e),
                        })
                    })
                }
            })
            .await
    }

    /// Update read counters; failures are logged and ignored
    async fn touch(&self, id: &str) {
        let mut pipe = redis::pipe();
        pipe.cmd("HINCRBY")
            .arg(self.metadata_key(id))
            .arg("access_count")
            .arg(1)
            .ignore()
            .cmd("HSET")
            .arg(self.metadata_key(id))
            .arg("last_access")
            .arg(Utc::now().to_rfc3339())
            .ignore();

        let mut conn = self.connection_manager.clone();
        if let Err(e) = pipe.query_async::<_, ()>(&mut conn).await {
            warn!(schema_id = %id, error = %e, "Failed to update access counters");
        }
    }

    fn parse_time(fields: &HashMap<String, String>, name: &str) -> Option<DateTime<Utc>> {
        fields
            .get(name)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

#[async_trait]
impl StorageBackend for RedisStorage {
    fn backend_type(&self) -> StorageBackendType {
        StorageBackendType::Redis
    }

    async fn get(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<Vec<u8>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(self.record_key(id));

        let data: Option<Vec<u8>> = self.query("get", self.retry, &cmd, cancel).await?;
        let data = data.ok_or_else(|| StorageError::not_found(id))?;

        self.touch(id).await;
        Ok(data)
    }

    async fn set(
        &self,
        id: &str,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        ensure_non_empty(data)?;
        ensure_active(cancel, "set")?;

        let mut get = redis::cmd("GET");
        get.arg(self.record_key(id));
        let previous: Option<Vec<u8>> = self.query("set", self.retry, &get, cancel).await?;

        let now = Utc::now().to_rfc3339();
        let expiry = self.ttl.and_then(expiry_millis);
        let mut pipe = redis::pipe();
        pipe.atomic();

        let set = pipe.cmd("SET").arg(self.record_key(id)).arg(data);
        if let Some(ms) = expiry {
            set.arg("PX").arg(ms);
        }
        set.ignore();

        pipe.cmd("HSET")
            .arg(self.metadata_key(id))
            .arg("size")
            .arg(data.len())
            .arg("updated_at")
            .arg(&now)
            .ignore()
            .cmd("HSETNX")
            .arg(self.metadata_key(id))
            .arg("created_at")
            .arg(&now)
            .ignore()
            .cmd("SADD")
            .arg(self.index_key())
            .arg(id)
            .ignore();
        if let Some(ms) = expiry {
            pipe.cmd("PEXPIRE").arg(self.metadata_key(id)).arg(ms).ignore();
        }

        if previous.is_some() || expiry.is_some() {
            let mut range = redis::cmd("ZRANGE");
            range.arg(self.versions_key(id)).arg(0).arg(-1);
            let mut tags: Vec<String> = self.query("set", self.retry, &range, cancel).await?;

            match previous {
                Some(previous) if self.policy.retains_history() => {
                    let mut incr = redis::cmd("INCR");
                    incr.arg(self.sequence_key(id));
                    let sequence: u64 = self
                        .query("set", self.retry.single_attempt(), &incr, cancel)
                        .await?;
                    let tag = format_version_tag(u128::from(sequence));
                    tags.push(tag.clone());

                    pipe.cmd("SET")
                        .arg(self.version_key(id, &tag))
                        .arg(previous)
                        .ignore()
                        .cmd("ZADD")
                        .arg(self.versions_key(id))
                        .arg(sequence)
                        .arg(&tag)
                        .ignore();

                    let stale = self.policy.overflow(tags.len());
                    for tag in tags.drain(..stale) {
                        pipe.cmd("ZREM")
                            .arg(self.versions_key(id))
                            .arg(&tag)
                            .ignore()
                            .cmd("DEL")
                            .arg(self.version_key(id, &tag))
                            .ignore();
                    }
                }
                Some(_) => {
                    for tag in tags.drain(..) {
                        pipe.cmd("DEL").arg(self.version_key(id, &tag)).ignore();
                    }
                    pipe.cmd("DEL").arg(self.versions_key(id)).ignore();
                }
                None => {}
            }

            // history lives exactly as long as the record it belongs to
            if let Some(ms) = expiry {
                for tag in &tags {
                    pipe.cmd("PEXPIRE")
                        .arg(self.version_key(id, tag))
                        .arg(ms)
                        .ignore();
                }
                pipe.cmd("PEXPIRE")
                    .arg(self.versions_key(id))
                    .arg(ms)
                    .ignore()
                    .cmd("PEXPIRE")
                    .arg(self.sequence_key(id))
                    .arg(ms)
                    .ignore();
            }
        }

        self.execute("set", &pipe, cancel).await?;
        debug!(schema_id = %id, size = data.len(), "Stored schema in Redis");
        Ok(())
    }

    async fn delete(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        if !self.exists(id, cancel).await? {
            return Err(StorageError::not_found(id).into());
        }

        let mut range = redis::cmd("ZRANGE");
        range.arg(self.versions_key(id)).arg(0).arg(-1);
        let tags: Vec<String> = self.query("delete", self.retry, &range, cancel).await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("DEL")
            .arg(self.record_key(id))
            .arg(self.metadata_key(id))
            .arg(self.versions_key(id))
            .arg(self.sequence_key(id))
            .ignore()
            .cmd("SREM")
            .arg(self.index_key())
            .arg(id)
            .ignore();
        for tag in &tags {
            pipe.cmd("DEL").arg(self.version_key(id, tag)).ignore();
        }

        self.execute("delete", &pipe, cancel).await
    }

    async fn exists(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(self.record_key(id));
        let count: u64 = self.query("exists", self.retry, &cmd, cancel).await?;
        Ok(count > 0)
    }

    async fn list(
        &self,
        filter: Option<&StorageFilter>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(self.index_key());
        let ids: Vec<String> = self.query("list", self.retry, &cmd, cancel).await?;
        if ids.is_empty() {
            return Ok(ids);
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.cmd("EXISTS").arg(self.record_key(id));
        }
        let exists: Vec<u64> = self.query_pipe("list", &pipe, cancel).await?;
        let (live, stale) = partition_live(ids, &exists);

        if !stale.is_empty() {
            let mut srem = redis::cmd("SREM");
            srem.arg(self.index_key()).arg(&stale);
            let mut conn = self.connection_manager.clone();
            match srem.query_async::<_, u64>(&mut conn).await {
                Ok(removed) => debug!(removed, "Pruned expired ids from index"),
                Err(e) => warn!(error = %e, "Failed to prune expired ids from index"),
            }
        }

        Ok(apply_filter(live, filter))
    }

    async fn get_version(
        &self,
        id: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<u8>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(self.version_key(id, version));
        let data: Option<Vec<u8>> = self.query("get_version", self.retry, &cmd, cancel).await?;
        data.ok_or_else(|| StorageError::version_not_found(id, version).into())
    }

    async fn list_versions(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        let mut cmd = redis::cmd("ZRANGE");
        cmd.arg(self.versions_key(id)).arg(0).arg(-1);
        self.query("list_versions", self.retry, &cmd, cancel).await
    }

    async fn get_batch(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<HashMap<String, Vec<u8>>> {
        ensure_active(cancel, "get_batch")?;
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut cmd = redis::cmd("MGET");
        for id in ids {
            cmd.arg(self.record_key(id));
        }
        let values: Vec<Option<Vec<u8>>> = self.query("get_batch", self.retry, &cmd, cancel).await?;

        let found: HashMap<String, Vec<u8>> = ids
            .iter()
            .zip(values)
            .filter_map(|(id, value)| value.map(|data| (id.clone(), data)))
            .collect();

        for id in found.keys() {
            self.touch(id).await;
        }
        Ok(found)
    }

    async fn set_batch(
        &self,
        items: &HashMap<String, Vec<u8>>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        for data in items.values() {
            ensure_non_empty(data)?;
        }

        fan_out(
            "set_batch",
            items.keys().cloned().collect(),
            self.batch_concurrency,
            cancel,
            |id, token| async move {
                let data = items.get(&id).map(Vec::as_slice).unwrap_or_default();
                self.set(&id, data, &token).await.map(|_| None::<()>)
            },
        )
        .await?;

        Ok(())
    }

    async fn get_metadata(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<StorageMetadata> {
        if !self.exists(id, cancel).await? {
            return Err(StorageError::not_found(id).into());
        }

        let mut hgetall = redis::cmd("HGETALL");
        hgetall.arg(self.metadata_key(id));
        let fields: HashMap<String, String> =
            self.query("get_metadata", self.retry, &hgetall, cancel).await?;

        let mut zcard = redis::cmd("ZCARD");
        zcard.arg(self.versions_key(id));
        let version_count: usize = self.query("get_metadata", self.retry, &zcard, cancel).await?;

        let updated_at = Self::parse_time(&fields, "updated_at").unwrap_or_else(Utc::now);
        let mut attributes = HashMap::new();
        attributes.insert("key".to_string(), self.record_key(id));

        Ok(StorageMetadata {
            id: id.to_string(),
            size: fields
                .get("size")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            created_at: Self::parse_time(&fields, "created_at").unwrap_or(updated_at),
            updated_at,
            access_count: fields
                .get("access_count")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            last_access: Self::parse_time(&fields, "last_access"),
            version_count,
            attributes,
        })
    }

    async fn health(&self, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        let probe = RetryPolicy {
            retries: 0,
            delay: Duration::ZERO,
            timeout: Some(HEALTH_PROBE_TIMEOUT),
        };
        let pong: String = self.query("health", probe, &redis::cmd("PING"), cancel).await?;
        if pong.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(SchemaRegistryError::storage(&format!(
                "unexpected PING reply: {}",
                pong
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_millis_bounds() {
        assert_eq!(expiry_millis(Duration::ZERO), None);
        assert_eq!(expiry_millis(Duration::from_micros(10)), Some(1));
        assert_eq!(expiry_millis(Duration::from_secs(60)), Some(60_000));
        assert_eq!(expiry_millis(Duration::from_secs(u64::MAX)), Some(MAX_EXPIRY_MS));
        assert_eq!(expiry_millis(Duration::MAX), Some(MAX_EXPIRY_MS));
    }

    #[test]
    fn test_partition_live_drops_missing_records() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let (live, stale) = partition_live(ids, &[1, 0, 1]);
        assert_eq!(live, vec!["a", "c"]);
        assert_eq!(stale, vec!["b"]);
    }

    #[test]
    fn test_partition_live_treats_missing_replies_as_gone() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let (live, stale) = partition_live(ids, &[1]);
        assert_eq!(live, vec!["a"]);
        assert_eq!(stale, vec!["b"]);
    }
}
