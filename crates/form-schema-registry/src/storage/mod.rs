//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Storage backends for the Schema Registry
//!
//! This module provides the storage capability set and its memory,
//! filesystem, redis and object store implementations. Backends treat
//! documents as opaque bytes keyed by schema id.

pub mod batch;
pub mod error;
pub mod file;
pub mod memory;
pub mod redis;
pub mod retry;
pub mod s3;
pub mod versioning;


use crate::config::{FeaturesConfig, SchemaRegistryConfig, StorageBackendType};
use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Deadline applied to backend health probes
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Message used when a write carries no bytes
pub const EMPTY_DATA_MESSAGE: &str = "cannot store empty schema data";

/// Storage backend trait
///
/// Every operation accepts a cancellation token. Long running operations
/// (listing and batches) check it between sub-operations.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend type
    fn backend_type(&self) -> StorageBackendType;

    /// Retrieve the current bytes of an id
    async fn get(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<Vec<u8>>;

    /// Store bytes under an id, archiving the previous value
    async fn set(&self, id: &str, data: &[u8], cancel: &CancellationToken)
        -> SchemaRegistryResult<()>;

    /// Delete an id together with its history and metadata
    async fn delete(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<()>;

    /// Check whether an id has a current record
    async fn exists(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<bool>;

    /// List ids, sorted, honoring the filter
    async fn list(
        &self,
        filter: Option<&StorageFilter>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>>;

    /// Retrieve an archived version
    async fn get_version(
        &self,
        id: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<u8>>;

    /// List archived version tags, oldest first
    async fn list_versions(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>>;

    /// Retrieve several ids; missing ids are omitted
    async fn get_batch(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<HashMap<String, Vec<u8>>>;

    /// Store several ids; atomic per id, not across ids
    async fn set_batch(
        &self,
        items: &HashMap<String, Vec<u8>>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()>;

    /// Retrieve record metadata
    async fn get_metadata(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<StorageMetadata>;

    /// Probe the underlying store
    async fn health(&self, cancel: &CancellationToken) -> SchemaRegistryResult<()>;

    /// Release backend resources
    async fn shutdown(&self) -> SchemaRegistryResult<()> {
        Ok(())
    }
}

/// Listing filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageFilter {
    /// Number of ids to skip
    pub offset: usize,

    /// Maximum number of ids to return
    pub limit: Option<usize>,

    /// Only ids starting with this prefix
    pub prefix: Option<String>,
}

impl StorageFilter {
    /// Filter returning a page of ids
    pub fn page(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
            prefix: None,
        }
    }

    /// Restrict to ids with a prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Whether an id passes the predicates (ignores paging)
    pub fn matches(&self, id: &str) -> bool {
        self.prefix
            .as_deref()
            .map_or(true, |prefix| id.starts_with(prefix))
    }

    /// Apply predicates and paging to a sorted id list
    pub fn apply(&self, ids: Vec<String>) -> Vec<String> {
        ids.into_iter()
            .filter(|id| self.matches(id))
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Apply an optional filter to ids, sorting them first
pub fn apply_filter(mut ids: Vec<String>, filter: Option<&StorageFilter>) -> Vec<String> {
    ids.sort();
    ids.dedup();
    match filter {
        Some(filter) => filter.apply(ids),
        None => ids,
    }
}

/// Storage record metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageMetadata {
    /// Schema id
    pub id: String,

    /// Byte length of the current record
    pub size: u64,

    /// First write
    pub created_at: DateTime<Utc>,

    /// Most recent write
    pub updated_at: DateTime<Utc>,

    /// Reads since the backend started (best-effort)
    pub access_count: u64,

    /// Most recent read
    pub last_access: Option<DateTime<Utc>>,

    /// Number of archived versions
    pub version_count: usize,

    /// Backend specific attributes
    pub attributes: HashMap<String, String>,
}

/// Access counters kept next to a record
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessStats {
    /// Number of reads
    pub count: u64,

    /// Most recent read
    pub last_access: Option<DateTime<Utc>>,
}

impl AccessStats {
    /// Record a read
    pub fn touch(&mut self) {
        self.count += 1;
        self.last_access = Some(Utc::now());
    }
}

/// Version retention policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPolicy {
    /// Archive previous values on overwrite
    pub enabled: bool,

    /// Maximum history length per id
    pub max_versions: usize,
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_versions: 10,
        }
    }
}

impl VersionPolicy {
    /// Policy that keeps no history
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_versions: 0,
        }
    }

    /// Whether overwrites should be archived at all
    pub fn retains_history(&self) -> bool {
        self.enabled && self.max_versions > 0
    }

    /// Number of oldest entries to discard from a history of `len`
    pub fn overflow(&self, len: usize) -> usize {
        if !self.retains_history() {
            return len;
        }
        len.saturating_sub(self.max_versions)
    }
}

impl From<&FeaturesConfig> for VersionPolicy {
    fn from(features: &FeaturesConfig) -> Self {
        Self {
            enabled: features.enable_versioning,
            max_versions: features.max_versions,
        }
    }
}

/// Fail with `Cancelled` if the token fired
pub fn ensure_active(cancel: &CancellationToken, operation: &str) -> SchemaRegistryResult<()> {
    if cancel.is_cancelled() {
        return Err(SchemaRegistryError::cancelled(operation));
    }
    Ok(())
}

/// Reject writes without bytes
pub fn ensure_non_empty(data: &[u8]) -> SchemaRegistryResult<()> {
    if data.is_empty() {
        return Err(StorageError::InvalidSchemaData {
            message: EMPTY_DATA_MESSAGE.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Create the storage backend named by the configuration
pub async fn create_storage_backend(
    config: &SchemaRegistryConfig,
) -> SchemaRegistryResult<Arc<dyn StorageBackend>> {
    let policy = VersionPolicy::from(&config.features);
    let storage = &config.storage;

    tracing::info!(backend = %storage.backend, "Creating storage backend");

    match storage.backend {
        StorageBackendType::Memory => Ok(Arc::new(MemoryStorage::with_policy(policy))),
        StorageBackendType::File => {
            let settings = storage.file_settings();
            let backend = FileStorage::new(settings.base_path, policy)
                .await?
                .with_batch_concurrency(storage.batch_concurrency);
            Ok(Arc::new(backend))
        }
        StorageBackendType::Redis => {
            let settings = storage.redis_settings().ok_or_else(|| {
                SchemaRegistryError::config("storage.backend_settings.url is required for redis")
            })?;
            let backend = RedisStorage::new(&settings, policy, RetryPolicy::from(storage))
                .await?
                .with_batch_concurrency(storage.batch_concurrency);
            Ok(Arc::new(backend))
        }
        StorageBackendType::S3 => {
            let settings = storage.s3_settings().ok_or_else(|| {
                SchemaRegistryError::config("storage.backend_settings.bucket is required for s3")
            })?;
            let backend = S3Storage::new(&settings, policy, RetryPolicy::from(storage))
                .await?
                .with_batch_concurrency(storage.batch_concurrency);
            Ok(Arc::new(backend))
        }
    }
}

// Re-export storage implementations
pub use error::StorageError;
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use redis::RedisStorage;
pub use retry::RetryPolicy;
pub use s3::S3Storage;
