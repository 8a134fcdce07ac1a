//! In-memory storage implementation

use crate::config::StorageBackendType;
use crate::error::SchemaRegistryResult;
use crate::storage::versioning::next_version_tag;
use crate::storage::{
    apply_filter, ensure_active, ensure_non_empty, AccessStats, StorageBackend, StorageError,
    StorageFilter, StorageMetadata, VersionPolicy,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Write timestamps of a record
#[derive(Debug, Clone, Copy)]
struct RecordTimes {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Maps guarded together so a write is one atomic swap
#[derive(Debug, Default)]
struct MemoryState {
    /// Current bytes per id
    schemas: BTreeMap<String, Vec<u8>>,

    /// Archived bytes per id, keyed by version tag
    versions: HashMap<String, BTreeMap<String, Vec<u8>>>,

    /// Write timestamps per id
    metadata: HashMap<String, RecordTimes>,
}

impl MemoryState {
    fn store(&mut self, id: &str, data: &[u8], policy: VersionPolicy) {
        let now = Utc::now();

        if let Some(previous) = self.schemas.insert(id.to_string(), data.to_vec()) {
            if policy.retains_history() {
                let history = self.versions.entry(id.to_string()).or_default();
                let tag = next_version_tag(history.keys().next_back().map(String::as_str));
                history.insert(tag, previous);

                for _ in 0..policy.overflow(history.len()) {
                    history.pop_first();
                }
            } else {
                self.versions.remove(id);
            }
        }

        self.metadata
            .entry(id.to_string())
            .and_modify(|times| times.updated_at = now)
            .or_insert(RecordTimes {
                created_at: now,
                updated_at: now,
            });
    }
}

/// In-memory storage implementation
pub struct MemoryStorage {
    /// Records, history and timestamps
    state: Arc<RwLock<MemoryState>>,

    /// Read counters, updated outside the write lock
    access: DashMap<String, AccessStats>,

    /// Retention policy
    policy: VersionPolicy,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::with_policy(VersionPolicy::default())
    }

    /// Create a memory storage instance with a retention policy
    pub fn with_policy(policy: VersionPolicy) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            access: DashMap::new(),
            policy,
        }
    }

    fn touch(&self, id: &str) {
        self.access.entry(id.to_string()).or_default().touch();
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn backend_type(&self) -> StorageBackendType {
        StorageBackendType::Memory
    }

    async fn get(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<Vec<u8>> {
        ensure_active(cancel, "get")?;

        let data = {
            let state = self.state.read().await;
            state
                .schemas
                .get(id)
                .cloned()
                .ok_or_else(|| StorageError::not_found(id))?
        };

        self.touch(id);
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

        let mut state = self.state.write().await;
        state.store(id, data, self.policy);
        Ok(())
    }

    async fn delete(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        ensure_active(cancel, "delete")?;

        {
            let mut state = self.state.write().await;
            if state.schemas.remove(id).is_none() {
                return Err(StorageError::not_found(id).into());
            }
            state.versions.remove(id);
            state.metadata.remove(id);
        }

        self.access.remove(id);
        Ok(())
    }

    async fn exists(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<bool> {
        ensure_active(cancel, "exists")?;
        Ok(self.state.read().await.schemas.contains_key(id))
    }

    async fn list(
        &self,
        filter: Option<&StorageFilter>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        ensure_active(cancel, "list")?;
        let ids = self.state.read().await.schemas.keys().cloned().collect();
        Ok(apply_filter(ids, filter))
    }

    async fn get_version(
        &self,
        id: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<u8>> {
        ensure_active(cancel, "get_version")?;

        let state = self.state.read().await;
        state
            .versions
            .get(id)
            .and_then(|history| history.get(version))
            .cloned()
            .ok_or_else(|| StorageError::version_not_found(id, version).into())
    }

    async fn list_versions(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        ensure_active(cancel, "list_versions")?;

        let state = self.state.read().await;
        Ok(state
            .versions
            .get(id)
            .map(|history| history.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_batch(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::with_capacity(ids.len());

        {
            let state = self.state.read().await;
            for id in ids {
                ensure_active(cancel, "get_batch")?;
                if let Some(data) = state.schemas.get(id) {
                    found.insert(id.clone(), data.clone());
                }
            }
        }

        for id in found.keys() {
            self.touch(id);
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

        let mut ordered: Vec<_> = items.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(b.0));

        let mut state = self.state.write().await;
        for (id, data) in ordered {
            ensure_active(cancel, "set_batch")?;
            state.store(id, data, self.policy);
        }
        Ok(())
    }

    async fn get_metadata(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<StorageMetadata> {
        ensure_active(cancel, "get_metadata")?;

        let state = self.state.read().await;
        let data = state
            .schemas
            .get(id)
            .ok_or_else(|| StorageError::not_found(id))?;
        let now = Utc::now();
        let times = state.metadata.get(id).copied().unwrap_or(RecordTimes {
            created_at: now,
            updated_at: now,
        });
        let access = self.access.get(id).map(|a| *a).unwrap_or_default();

        Ok(StorageMetadata {
            id: id.to_string(),
            size: data.len() as u64,
            created_at: times.created_at,
            updated_at: times.updated_at,
            access_count: access.count,
            last_access: access.last_access,
            version_count: state.versions.get(id).map_or(0, BTreeMap::len),
            attributes: HashMap::new(),
        })
    }

    async fn health(&self, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        ensure_active(cancel, "health")
    }
}
