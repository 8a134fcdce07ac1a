//! Filesystem storage implementation
//!
//! Layout under the base path:
//!
//! ```text
//! <base>/user/profile.json                      current record of "user.profile"
//! <base>/.versions/user.profile/<tag>.json      archived versions
//! ```
//!
//! Writes go to a temporary file in the target directory followed by a
//! rename, so readers observe either the old or the new bytes.

use crate::config::StorageBackendType;
use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use crate::schema::{id_to_relative_path, validate_schema_id};
use crate::storage::batch::{fan_out, DEFAULT_BATCH_CONCURRENCY};
use crate::storage::versioning::{next_version_tag, sort_version_tags};
use crate::storage::{
    apply_filter, ensure_active, ensure_non_empty, AccessStats, StorageBackend, StorageError,
    StorageFilter, StorageMetadata, VersionPolicy, HEALTH_PROBE_TIMEOUT,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory holding archived versions
const VERSIONS_DIR: &str = ".versions";

/// Extension of stored documents
const EXTENSION: &str = "json";

/// Filesystem storage implementation
pub struct FileStorage {
    /// Root directory
    base_path: PathBuf,

    /// Serializes writers; the filesystem gives readers atomic renames
    write_lock: Mutex<()>,

    /// Read counters (not persisted)
    access: DashMap<String, AccessStats>,

    /// Retention policy
    policy: VersionPolicy,

    /// Worker bound for batch fan-out
    batch_concurrency: usize,
}

impl FileStorage {
    /// Create a filesystem storage rooted at `base_path`, creating it if missing
    pub async fn new(
        base_path: impl Into<PathBuf>,
        policy: VersionPolicy,
    ) -> SchemaRegistryResult<Self> {
        let base_path = base_path.into();
        tokio::fs::create_dir_all(&base_path).await.map_err(|e| {
            SchemaRegistryError::storage(&format!(
                "failed to create base path {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(Self {
            base_path,
            write_lock: Mutex::new(()),
            access: DashMap::new(),
            policy,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        })
    }

    /// Set the worker bound for batch operations
    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    /// Root directory
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.{}", id_to_relative_path(id), EXTENSION))
    }

    fn versions_dir(&self, id: &str) -> PathBuf {
        self.base_path.join(VERSIONS_DIR).join(id)
    }

    fn version_path(&self, id: &str, version: &str) -> PathBuf {
        self.versions_dir(id)
            .join(format!("{}.{}", version, EXTENSION))
    }

    async fn read_optional(path: &Path) -> SchemaRegistryResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", path, e)),
        }
    }

    /// Write bytes through a temporary sibling and rename it into place
    async fn write_atomic(path: &Path, data: &[u8]) -> SchemaRegistryResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| SchemaRegistryError::internal("record path has no parent"))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error("create directory", parent, e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&temp, data).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error("write", &temp, e));
        }
        if let Err(e) = tokio::fs::rename(&temp, path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error("rename", path, e));
        }
        Ok(())
    }

    async fn version_tags(&self, id: &str) -> SchemaRegistryResult<Vec<String>> {
        let dir = self.versions_dir(id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("read directory", &dir, e)),
        };

        let mut tags = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("read directory", &dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    tags.push(stem.to_string());
                }
            }
        }

        sort_version_tags(&mut tags);
        Ok(tags)
    }

    async fn archive(&self, id: &str, previous: &[u8]) -> SchemaRegistryResult<()> {
        if !self.policy.retains_history() {
            return self.remove_versions(id).await;
        }

        let mut tags = self.version_tags(id).await?;
        let tag = next_version_tag(tags.last().map(String::as_str));
        Self::write_atomic(&self.version_path(id, &tag), previous).await?;
        tags.push(tag);

        let overflow = self.policy.overflow(tags.len());
        for stale in tags.iter().take(overflow) {
            let path = self.version_path(id, stale);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != ErrorKind::NotFound {
                    return Err(io_error("remove version", &path, e));
                }
            }
        }
        Ok(())
    }

    async fn remove_versions(&self, id: &str) -> SchemaRegistryResult<()> {
        let dir = self.versions_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove versions", &dir, e)),
        }
    }

    /// Remove now-empty directories between a deleted record and the base path
    async fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.base_path || !dir.starts_with(&self.base_path) {
                break;
            }
            // remove_dir fails on non-empty directories, which ends the walk
            if tokio::fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }

    async fn store(&self, id: &str, data: &[u8]) -> SchemaRegistryResult<()> {
        let path = self.record_path(id);
        let _guard = self.write_lock.lock().await;

        if let Some(previous) = Self::read_optional(&path).await? {
            self.archive(id, &previous).await?;
        }

        Self::write_atomic(&path, data).await?;
        debug!(schema_id = %id, path = %path.display(), "Stored schema file");
        Ok(())
    }

    fn collect_ids(base: &Path) -> Vec<String> {
        let mut ids = Vec::new();

        let walker = WalkDir::new(base)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !(entry.file_name() == VERSIONS_DIR
                        || entry.file_name().to_string_lossy().starts_with('.'))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry while listing schemas");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Ok(relative) = path.with_extension("").strip_prefix(base).map(Path::to_path_buf)
            else {
                continue;
            };

            let segments: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            // a dotted file name would not map back to its own path
            if segments.iter().any(|s| s.contains('.')) {
                continue;
            }
            let id = segments.join(".");

            match validate_schema_id(&id) {
                Ok(()) => ids.push(id),
                Err(e) => debug!(path = %path.display(), error = %e, "Ignoring file outside id syntax"),
            }
        }

        ids
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> SchemaRegistryError {
    SchemaRegistryError::storage(&format!(
        "failed to {} {}: {}",
        action,
        path.display(),
        err
    ))
}

fn system_time(time: std::io::Result<std::time::SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl StorageBackend for FileStorage {
    fn backend_type(&self) -> StorageBackendType {
        StorageBackendType::File
    }

    async fn get(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<Vec<u8>> {
        ensure_active(cancel, "get")?;

        let data = Self::read_optional(&self.record_path(id))
            .await?
            .ok_or_else(|| StorageError::not_found(id))?;

        self.access.entry(id.to_string()).or_default().touch();
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
        self.store(id, data).await
    }

    async fn delete(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        ensure_active(cancel, "delete")?;

        let path = self.record_path(id);
        let _guard = self.write_lock.lock().await;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::not_found(id).into())
            }
            Err(e) => return Err(io_error("delete", &path, e)),
        }

        self.remove_versions(id).await?;
        self.prune_empty_parents(&path).await;
        self.access.remove(id);
        Ok(())
    }

    async fn exists(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<bool> {
        ensure_active(cancel, "exists")?;

        let path = self.record_path(id);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("stat", &path, e)),
        }
    }

    async fn list(
        &self,
        filter: Option<&StorageFilter>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        ensure_active(cancel, "list")?;

        let base = self.base_path.clone();
        let walk = tokio::task::spawn_blocking(move || Self::collect_ids(&base));

        let ids = tokio::select! {
            _ = cancel.cancelled() => return Err(SchemaRegistryError::cancelled("list")),
            joined = walk => joined.map_err(|e| {
                SchemaRegistryError::internal(&format!("listing task failed: {}", e))
            })?,
        };

        Ok(apply_filter(ids, filter))
    }

    async fn get_version(
        &self,
        id: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<u8>> {
        ensure_active(cancel, "get_version")?;

        Self::read_optional(&self.version_path(id, version))
            .await?
            .ok_or_else(|| StorageError::version_not_found(id, version).into())
    }

    async fn list_versions(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        ensure_active(cancel, "list_versions")?;
        self.version_tags(id).await
    }

    async fn get_batch(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<HashMap<String, Vec<u8>>> {
        let found = fan_out(
            "get_batch",
            ids.to_vec(),
            self.batch_concurrency,
            cancel,
            |id, token| async move {
                match self.get(&id, &token).await {
                    Ok(data) => Ok(Some(data)),
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(e),
                }
            },
        )
        .await?;

        Ok(found.into_iter().collect())
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
        ensure_active(cancel, "get_metadata")?;

        let path = self.record_path(id);
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(StorageError::not_found(id).into()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::not_found(id).into())
            }
            Err(e) => return Err(io_error("stat", &path, e)),
        };

        let updated_at = system_time(meta.modified()).unwrap_or_else(Utc::now);
        let created_at = system_time(meta.created()).unwrap_or(updated_at);
        let access = self.access.get(id).map(|a| *a).unwrap_or_default();

        let mut attributes = HashMap::new();
        attributes.insert("path".to_string(), path.display().to_string());

        Ok(StorageMetadata {
            id: id.to_string(),
            size: meta.len(),
            created_at,
            updated_at,
            access_count: access.count,
            last_access: access.last_access,
            version_count: self.version_tags(id).await?.len(),
            attributes,
        })
    }

    async fn health(&self, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        ensure_active(cancel, "health")?;

        let probe = tokio::time::timeout(HEALTH_PROBE_TIMEOUT, tokio::fs::metadata(&self.base_path));
        match probe.await {
            Ok(Ok(meta)) if meta.is_dir() => Ok(()),
            Ok(Ok(_)) => Err(SchemaRegistryError::storage(&format!(
                "base path {} is not a directory",
                self.base_path.display()
            ))),
            Ok(Err(e)) => Err(io_error("access base path", &self.base_path, e)),
            Err(_) => Err(SchemaRegistryError::timeout("filesystem health probe")),
        }
    }
}
