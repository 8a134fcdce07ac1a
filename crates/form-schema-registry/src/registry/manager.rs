//! Schema Registry facade
//!
//! Orchestrates validation, codec, storage, cache, events and metrics.
//! Every public operation runs under one registry-wide read-write lock:
//! reads share it, mutations and cache management hold it exclusively.
//! Lock acquisition observes the caller's cancellation token.

use crate::cache::CacheBackend;
use crate::config::SchemaRegistryConfig;
use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use crate::events::{EventBus, EventHandler, RegistryEvent, RegistryEventKind};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::registry::builder::SchemaRegistryBuilder;
use crate::registry::operations::DocumentPipeline;
use crate::registry::state::{RegistryState, RegistryStats};
use crate::schema::{
    current_cache_key, validate_schema_id, validate_version_tag, version_cache_key,
    SchemaDocument,
};
use crate::storage::{ensure_active, StorageBackend, StorageFilter, StorageMetadata};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Schema Registry
pub struct SchemaRegistry {
    /// Configuration
    config: SchemaRegistryConfig,

    /// Storage backend
    storage: Arc<dyn StorageBackend>,

    /// Cache stack, absent when caching is disabled
    cache: Option<Arc<dyn CacheBackend>>,

    /// Validator, codec and payload transforms
    pipeline: DocumentPipeline,

    /// Lifecycle event fan-out
    events: EventBus,

    /// Metrics collector
    metrics: MetricsCollector,

    /// Lifecycle flags
    state: RwLock<RegistryState>,

    /// Registry-wide operation lock
    lock: RwLock<()>,
}

impl SchemaRegistry {
    /// Create a registry with backends built from configuration
    pub async fn new(config: SchemaRegistryConfig) -> SchemaRegistryResult<Self> {
        Self::builder(config).build().await
    }

    /// Start a builder that accepts injected backends
    pub fn builder(config: SchemaRegistryConfig) -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::new(config)
    }

    pub(crate) async fn assemble(
        config: SchemaRegistryConfig,
        storage: Arc<dyn StorageBackend>,
        cache: Option<Arc<dyn CacheBackend>>,
        pipeline: DocumentPipeline,
    ) -> Self {
        let metrics = MetricsCollector::new(config.features.enable_metrics);

        // seed the schema count; a backend that cannot list yet is not fatal
        match storage.list(None, &CancellationToken::new()).await {
            Ok(ids) => metrics.set_schema_count(ids.len() as i64),
            Err(e) => warn!(error = %e, "Could not count existing schemas"),
        }

        let mut state = RegistryState::new();
        state.mark_initialized();

        info!(
            backend = %storage.backend_type(),
            cache = cache.as_ref().map_or("none", |c| c.name()),
            codec = pipeline.codec_name(),
            versioning = config.features.enable_versioning,
            "Schema registry initialized"
        );

        Self {
            config,
            storage,
            cache,
            pipeline,
            events: EventBus::new(),
            metrics,
            state: RwLock::new(state),
            lock: RwLock::new(()),
        }
    }

    /// Configuration the registry was built with
    pub fn config(&self) -> &SchemaRegistryConfig {
        &self.config
    }

    /// Register a new schema; fails if the id is taken
    pub async fn register(
        &self,
        document: &SchemaDocument,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        self.metrics
            .time("register", self.register_inner(document, cancel))
            .await
    }

    /// Fetch the current document of an id
    pub async fn get(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<SchemaDocument> {
        self.metrics.time("get", self.get_inner(id, cancel)).await
    }

    /// Replace the document of an existing id, archiving the previous one
    pub async fn update(
        &self,
        document: &SchemaDocument,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        self.metrics
            .time("update", self.update_inner(document, cancel))
            .await
    }

    /// Remove an id together with its history and metadata
    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        self.metrics.time("delete", self.delete_inner(id, cancel)).await
    }

    /// Load the documents of every id matching the filter
    ///
    /// Ids whose document fails to load are logged and skipped.
    pub async fn list(
        &self,
        filter: Option<&StorageFilter>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<SchemaDocument>> {
        self.metrics.time("list", self.list_inner(filter, cancel)).await
    }

    /// Ids matching the filter, without loading documents
    pub async fn list_ids(
        &self,
        filter: Option<&StorageFilter>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        let _guard = self.shared("list_ids", cancel).await?;
        self.storage.list(filter, cancel).await
    }

    /// Fetch an archived version of an id
    pub async fn get_version(
        &self,
        id: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<SchemaDocument> {
        self.metrics
            .time("get_version", self.get_version_inner(id, version, cancel))
            .await
    }

    /// Archived version tags of an id, oldest first
    pub async fn list_versions(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        validate_schema_id(id)?;
        self.ensure_versioning()?;
        let _guard = self.shared("list_versions", cancel).await?;
        self.storage.list_versions(id, cancel).await
    }

    pub async fn exists(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<bool> {
        validate_schema_id(id)?;
        let _guard = self.shared("exists", cancel).await?;
        self.storage.exists(id, cancel).await
    }

    pub async fn get_metadata(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<StorageMetadata> {
        validate_schema_id(id)?;
        let _guard = self.shared("get_metadata", cancel).await?;
        self.storage.get_metadata(id, cancel).await
    }

    /// Probe storage and cache
    pub async fn health(&self, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        let outcome = {
            let _guard = self.shared("health", cancel).await?;
            self.probe(cancel).await
        };

        self.state.write().await.update_health(outcome.is_ok());
        outcome
    }

    /// Drop every cached entry
    pub async fn clear_cache(&self, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        let _guard = self.exclusive("clear_cache", cancel).await?;
        if let Some(cache) = &self.cache {
            match cache.clear().await {
                Ok(()) => debug!("Cleared schema cache"),
                Err(e) => warn!(error = %e, "Cache clear failed"),
            }
        }
        Ok(())
    }

    /// Drop the cached current document of an id
    pub async fn invalidate_cache(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        validate_schema_id(id)?;
        let _guard = self.exclusive("invalidate_cache", cancel).await?;
        self.cache_delete(&current_cache_key(id)).await;
        Ok(())
    }

    /// Register a synchronous event handler; a no-op when events are disabled
    ///
    /// Handlers run while the registry lock is held and must not call back
    /// into the registry.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        if self.config.features.enable_events {
            self.events.subscribe(handler);
        } else {
            debug!("Events disabled, ignoring subscription");
        }
    }

    /// Receiver of all events emitted from now on
    pub fn subscribe_channel(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe_channel()
    }

    /// Current metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Lifecycle flags
    pub async fn state(&self) -> RegistryState {
        self.state.read().await.clone()
    }

    /// Aggregate storage, cache and metrics statistics
    ///
    /// Walks the metadata of every id; meant for operators, not hot paths.
    pub async fn stats(&self, cancel: &CancellationToken) -> SchemaRegistryResult<RegistryStats> {
        let _guard = self.shared("stats", cancel).await?;

        let ids = self.storage.list(None, cancel).await?;
        let mut total_versions = 0u64;
        let mut total_size_bytes = 0u64;

        for id in &ids {
            ensure_active(cancel, "stats")?;
            match self.storage.get_metadata(id, cancel).await {
                Ok(metadata) => {
                    total_versions += metadata.version_count as u64;
                    total_size_bytes += metadata.size;
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!(schema_id = %id, error = %e, "Skipping metadata in stats"),
            }
        }

        let cache = match &self.cache {
            Some(cache) => cache.stats().await,
            None => None,
        };

        Ok(RegistryStats {
            backend: self.storage.backend_type().to_string(),
            total_schemas: ids.len() as u64,
            total_versions,
            total_size_bytes,
            cache,
            metrics: self.metrics.snapshot(),
            collected_at: Utc::now(),
        })
    }

    /// Release backend resources
    pub async fn shutdown(&self) -> SchemaRegistryResult<()> {
        let _guard = self.lock.write().await;

        self.storage.shutdown().await?;
        self.state.write().await.mark_shut_down();

        info!("Schema registry shutdown completed");
        Ok(())
    }

    async fn register_inner(
        &self,
        document: &SchemaDocument,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        let id = document.id.as_str();
        validate_schema_id(id)?;
        let _guard = self.exclusive("register", cancel).await?;

        if self.config.features.validate_on_store {
            self.pipeline.validate(document).await?;
        }
        if self.storage.exists(id, cancel).await? {
            return Err(SchemaRegistryError::SchemaAlreadyExists(id.to_string()));
        }

        let bytes = self.pipeline.encode(document)?;
        self.storage.set(id, &bytes, cancel).await?;

        self.cache_set(&current_cache_key(id), bytes, self.config.cache.memory_cache_ttl())
            .await;
        self.emit(RegistryEventKind::Registered, id);
        self.metrics.increment_schema_count();

        info!(schema_id = %id, version = %document.version, "Registered schema");
        Ok(())
    }

    async fn get_inner(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<SchemaDocument> {
        validate_schema_id(id)?;
        let _guard = self.shared("get", cancel).await?;

        let document = self.load_current(id, cancel).await?;
        self.emit(RegistryEventKind::Accessed, id);
        Ok(document)
    }

    async fn update_inner(
        &self,
        document: &SchemaDocument,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        let id = document.id.as_str();
        validate_schema_id(id)?;
        let _guard = self.exclusive("update", cancel).await?;

        if !self.storage.exists(id, cancel).await? {
            return Err(SchemaRegistryError::SchemaNotFound(id.to_string()));
        }
        if self.config.features.validate_on_store {
            self.pipeline.validate(document).await?;
        }

        let bytes = self.pipeline.encode(document)?;
        let cached_versions = self.cached_version_tags(id, cancel).await;
        self.storage.set(id, &bytes, cancel).await?;

        self.cache_delete(&current_cache_key(id)).await;
        self.evict_pruned_versions(id, cached_versions, cancel).await;
        self.emit(RegistryEventKind::Updated, id);

        info!(schema_id = %id, version = %document.version, "Updated schema");
        Ok(())
    }

    async fn delete_inner(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        validate_schema_id(id)?;
        let _guard = self.exclusive("delete", cancel).await?;

        let cached_versions = self.cached_version_tags(id, cancel).await;
        self.storage.delete(id, cancel).await?;

        self.cache_delete(&current_cache_key(id)).await;
        for tag in &cached_versions {
            self.cache_delete(&version_cache_key(id, tag)).await;
        }
        self.emit(RegistryEventKind::Deleted, id);
        self.metrics.decrement_schema_count();

        info!(schema_id = %id, "Deleted schema");
        Ok(())
    }

    async fn list_inner(
        &self,
        filter: Option<&StorageFilter>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<SchemaDocument>> {
        let _guard = self.shared("list", cancel).await?;

        let ids = self.storage.list(filter, cancel).await?;
        let mut documents = Vec::with_capacity(ids.len());

        for id in ids {
            ensure_active(cancel, "list")?;
            match self.load_current(&id, cancel).await {
                Ok(document) => {
                    self.emit(RegistryEventKind::Accessed, &id);
                    documents.push(document);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!(schema_id = %id, error = %e, "Skipping schema that failed to load"),
            }
        }

        Ok(documents)
    }

    async fn get_version_inner(
        &self,
        id: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<SchemaDocument> {
        validate_schema_id(id)?;
        validate_version_tag(id, version)?;
        self.ensure_versioning()?;
        let _guard = self.shared("get_version", cancel).await?;

        let key = version_cache_key(id, version);
        if let Some(bytes) = self.cache_get(&key).await {
            return self.decode_checked(id, bytes).await;
        }

        let bytes = self.storage.get_version(id, version, cancel).await?;
        let document = self.decode_checked(id, bytes.clone()).await?;
        self.cache_set(&key, bytes, self.config.cache.distributed_cache_ttl())
            .await;
        Ok(document)
    }

    /// Read-through load of the current document; caller holds the lock
    async fn load_current(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<SchemaDocument> {
        let key = current_cache_key(id);

        // cached bytes failing validation surface as errors and stay cached
        if let Some(bytes) = self.cache_get(&key).await {
            return self.decode_checked(id, bytes).await;
        }

        let bytes = self.storage.get(id, cancel).await?;
        let document = self.decode_checked(id, bytes.clone()).await?;
        self.cache_set(&key, bytes, self.config.cache.memory_cache_ttl())
            .await;
        Ok(document)
    }

    /// Decode stored bytes, check they belong to `id` and validate on load
    async fn decode_checked(&self, id: &str, bytes: Vec<u8>) -> SchemaRegistryResult<SchemaDocument> {
        let document = self.pipeline.decode(bytes)?;
        if document.id != id {
            return Err(SchemaRegistryError::deserialization(&format!(
                "record stored under {} carries id {}",
                id, document.id
            )));
        }
        if self.config.features.validate_on_load {
            self.pipeline.validate(&document).await?;
        }
        Ok(document)
    }

    async fn probe(&self, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        self.storage.health(cancel).await?;
        if let Some(cache) = &self.cache {
            cache.health().await?;
        }
        Ok(())
    }

    fn ensure_versioning(&self) -> SchemaRegistryResult<()> {
        if self.config.features.enable_versioning {
            Ok(())
        } else {
            Err(SchemaRegistryError::feature_disabled("versioning"))
        }
    }

    async fn shared(
        &self,
        operation: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<RwLockReadGuard<'_, ()>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SchemaRegistryError::cancelled(operation)),
            guard = self.lock.read() => Ok(guard),
        }
    }

    async fn exclusive(
        &self,
        operation: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<RwLockWriteGuard<'_, ()>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SchemaRegistryError::cancelled(operation)),
            guard = self.lock.write() => Ok(guard),
        }
    }

    fn emit(&self, kind: RegistryEventKind, id: &str) {
        if self.config.features.enable_events {
            self.events.emit(RegistryEvent::now(kind, id));
        }
    }

    async fn cache_get(&self, key: &str) -> Option<Vec<u8>> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(bytes)) => {
                self.metrics.record_cache_hit();
                Some(bytes)
            }
            Ok(None) => {
                self.metrics.record_cache_miss();
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                self.metrics.record_cache_miss();
                None
            }
        }
    }

    async fn cache_set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(key, bytes, ttl).await {
                warn!(key = %key, error = %e, "Cache write failed");
            }
        }
    }

    async fn cache_delete(&self, key: &str) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.delete(key).await {
                warn!(key = %key, error = %e, "Cache delete failed");
            }
        }
    }

    /// Version tags whose cache entries may need eviction later
    async fn cached_version_tags(&self, id: &str, cancel: &CancellationToken) -> Vec<String> {
        if self.cache.is_none() || !self.config.features.enable_versioning {
            return Vec::new();
        }
        match self.storage.list_versions(id, cancel).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(schema_id = %id, error = %e, "Could not list versions for cache eviction");
                Vec::new()
            }
        }
    }

    /// Evict cached versions that retention dropped from storage
    async fn evict_pruned_versions(
        &self,
        id: &str,
        before: Vec<String>,
        cancel: &CancellationToken,
    ) {
        if before.is_empty() {
            return;
        }
        let after: HashSet<String> = self
            .cached_version_tags(id, cancel)
            .await
            .into_iter()
            .collect();
        for tag in before.iter().filter(|tag| !after.contains(*tag)) {
            self.cache_delete(&version_cache_key(id, tag)).await;
        }
    }
}
