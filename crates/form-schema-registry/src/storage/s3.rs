//! S3 storage implementation
//!
//! Records live at `<prefix><id-as-path>.json`, archived versions at
//! `<prefix>.versions/<id>/<tag>.json`. Every record object carries the
//! `schema-id` and `type=schema` attributes.

use crate::config::{S3Settings, StorageBackendType};
use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use crate::schema::{id_to_relative_path, validate_schema_id};
use crate::storage::batch::{fan_out, DEFAULT_BATCH_CONCURRENCY};
use crate::storage::retry::RetryPolicy;
use crate::storage::versioning::{next_version_tag, sort_version_tags};
use crate::storage::{
    apply_filter, ensure_active, ensure_non_empty, AccessStats, StorageBackend, StorageError,
    StorageFilter, StorageMetadata, VersionPolicy, HEALTH_PROBE_TIMEOUT,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::{primitives::ByteStream, Client as S3Client};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Key segment holding archived versions
const VERSIONS_SEGMENT: &str = ".versions/";

/// Attribute names attached to record objects
const ATTR_SCHEMA_ID: &str = "schema-id";
const ATTR_TYPE: &str = "type";
const ATTR_CREATED_AT: &str = "created-at";

fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> SchemaRegistryError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("S3 {} failed: {}", operation, DisplayErrorContext(&err));
    match err {
        SdkError::TimeoutError(_) => SchemaRegistryError::timeout(&message),
        SdkError::DispatchFailure(_) => SchemaRegistryError::network(&message),
        _ => SchemaRegistryError::storage(&message),
    }
}

/// S3 storage implementation
pub struct S3Storage {
    s3_client: S3Client,
    bucket: String,
    key_prefix: String,

    /// Read counters (not persisted)
    access: DashMap<String, AccessStats>,

    /// Retention policy
    policy: VersionPolicy,

    /// Retry policy for primitive calls
    retry: RetryPolicy,

    /// Worker bound for batch fan-out
    batch_concurrency: usize,
}

impl S3Storage {
    /// Create a new S3 storage
    pub async fn new(
        settings: &S3Settings,
        policy: VersionPolicy,
        retry: RetryPolicy,
    ) -> SchemaRegistryResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let aws_config = loader.load().await;

        let s3_config_builder =
            aws_sdk_s3::config::Builder::from(&aws_config).force_path_style(settings.force_path_style);

        let s3_config_builder = if let (Some(access_key), Some(secret_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            s3_config_builder.credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
        } else {
            s3_config_builder
        };

        let s3_config_builder = if let Some(endpoint_url) = &settings.endpoint_url {
            s3_config_builder.endpoint_url(endpoint_url)
        } else {
            s3_config_builder
        };

        Ok(Self::from_client(
            S3Client::from_conf(s3_config_builder.build()),
            settings.bucket.clone(),
            settings.key_prefix.clone(),
            policy,
            retry,
        ))
    }

    /// Create a storage over an existing client
    pub fn from_client(
        s3_client: S3Client,
        bucket: String,
        key_prefix: String,
        policy: VersionPolicy,
        retry: RetryPolicy,
    ) -> Self {
        let mut key_prefix = key_prefix;
        if !key_prefix.is_empty() && !key_prefix.ends_with('/') {
            key_prefix.push('/');
        }

        Self {
            s3_client,
            bucket,
            key_prefix,
            access: DashMap::new(),
            policy,
            retry,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }

    /// Set the worker bound for batch operations
    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    /// Get the S3 key for a record
    fn record_key(&self, id: &str) -> String {
        format!("{}{}.json", self.key_prefix, id_to_relative_path(id))
    }

    /// Get the S3 key prefix for archived versions of an id
    fn versions_prefix(&self, id: &str) -> String {
        format!("{}{}{}/", self.key_prefix, VERSIONS_SEGMENT, id)
    }

    /// Get the S3 key for an archived version
    fn version_key(&self, id: &str, version: &str) -> String {
        format!("{}{}.json", self.versions_prefix(id), version)
    }

    /// Fetch an object, mapping a missing key to `None`
    async fn fetch(
        &self,
        operation: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Option<Vec<u8>>> {
        self.retry
            .run(operation, cancel, move || async move {
                let response = match self
                    .s3_client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        if e.as_service_error().map_or(false, |s| s.is_no_such_key()) {
                            return Ok(None);
                        }
                        return Err(sdk_error(operation, e));
                    }
                };

                let data = response.body.collect().await.map_err(|e| {
                    SchemaRegistryError::network(&format!(
                        "Failed to read object {} from S3: {}",
                        key, e
                    ))
                })?;
                Ok(Some(data.into_bytes().to_vec()))
            })
            .await
    }

    /// Put an object with attributes
    async fn put(
        &self,
        operation: &str,
        key: &str,
        data: &[u8],
        attributes: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        self.retry
            .run(operation, cancel, move || async move {
                let mut request = self
                    .s3_client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(ByteStream::from(data.to_vec()))
                    .content_type("application/json");
                for (name, value) in attributes {
                    request = request.metadata(name, value);
                }
                request
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| sdk_error(operation, e))
            })
            .await
    }

    /// Remove an object; missing keys are not an error at this level
    async fn remove(
        &self,
        operation: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        self.retry
            .run(operation, cancel, move || async move {
                self.s3_client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| sdk_error(operation, e))
            })
            .await
    }

    /// Head an object, mapping a missing key to `None`
    async fn head(
        &self,
        operation: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Option<aws_sdk_s3::operation::head_object::HeadObjectOutput>> {
        self.retry
            .run(operation, cancel, move || async move {
                match self
                    .s3_client
                    .head_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                {
                    Ok(output) => Ok(Some(output)),
                    Err(e) if e.as_service_error().map_or(false, |s| s.is_not_found()) => {
                        Ok(None)
                    }
                    Err(e) => Err(sdk_error(operation, e)),
                }
            })
            .await
    }

    /// List every key under a prefix, following continuation tokens
    async fn list_keys(
        &self,
        operation: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            ensure_active(cancel, operation)?;

            let token = continuation.clone();
            let response = self
                .retry
                .run(operation, cancel, || {
                    let token = token.clone();
                    async move {
                        self.s3_client
                            .list_objects_v2()
                            .bucket(&self.bucket)
                            .prefix(prefix)
                            .set_continuation_token(token)
                            .send()
                            .await
                            .map_err(|e| sdk_error(operation, e))
                    }
                })
                .await?;

            keys.extend(
                response
                    .contents
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|object| object.key),
            );

            match (response.is_truncated, response.next_continuation_token) {
                (Some(true), Some(next)) => continuation = Some(next),
                _ => break,
            }
        }

        Ok(keys)
    }

    /// Map an object key back to a schema id
    fn key_to_id(&self, key: &str) -> Option<String> {
        let relative = key.strip_prefix(&self.key_prefix)?;
        if relative.starts_with(VERSIONS_SEGMENT) {
            return None;
        }
        let path = relative.strip_suffix(".json")?;
        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|s| s.contains('.')) {
            return None;
        }
        let id = segments.join(".");
        validate_schema_id(&id).ok()?;
        Some(id)
    }

    async fn version_tags(
        &self,
        operation: &str,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        let prefix = self.versions_prefix(id);
        let mut tags: Vec<String> = self
            .list_keys(operation, &prefix, cancel)
            .await?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .filter(|tag| !tag.contains('/'))
                    .map(str::to_string)
            })
            .collect();
        sort_version_tags(&mut tags);
        Ok(tags)
    }

    /// Remove every archived version of an id
    async fn remove_versions(
        &self,
        operation: &str,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        for tag in self.version_tags(operation, id, cancel).await? {
            self.remove(operation, &self.version_key(id, &tag), cancel)
                .await?;
        }
        Ok(())
    }

    async fn archive(
        &self,
        id: &str,
        previous: &[u8],
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        let tags = self.version_tags("set", id, cancel).await?;
        let tag = next_version_tag(tags.last().map(String::as_str));
        let mut attributes = HashMap::new();
        attributes.insert(ATTR_SCHEMA_ID.to_string(), id.to_string());
        attributes.insert(ATTR_TYPE.to_string(), "schema-version".to_string());
        self.put("set", &self.version_key(id, &tag), previous, &attributes, cancel)
            .await?;

        let total = tags.len() + 1;
        for stale in tags.iter().take(self.policy.overflow(total)) {
            self.remove("set", &self.version_key(id, stale), cancel).await?;
        }
        Ok(())
    }

    /// Store a record with caller supplied attributes
    ///
    /// The required `schema-id` and `type=schema` attributes are always
    /// attached and cannot be overridden.
    pub async fn set_with_metadata(
        &self,
        id: &str,
        data: &[u8],
        extra: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<()> {
        ensure_non_empty(data)?;
        ensure_active(cancel, "set")?;

        let key = self.record_key(id);
        let existing = self.head("set", &key, cancel).await?;

        if existing.is_some() {
            if self.policy.retains_history() {
                if let Some(previous) = self.fetch("set", &key, cancel).await? {
                    self.archive(id, &previous, cancel).await?;
                }
            } else {
                self.remove_versions("set", id, cancel).await?;
            }
        }

        let now = Utc::now().to_rfc3339();
        let created_at = existing
            .as_ref()
            .and_then(|head| head.metadata.as_ref())
            .and_then(|m| m.get(ATTR_CREATED_AT).cloned())
            .unwrap_or(now);

        let mut attributes = extra.clone();
        attributes.insert(ATTR_SCHEMA_ID.to_string(), id.to_string());
        attributes.insert(ATTR_TYPE.to_string(), "schema".to_string());
        attributes.insert(ATTR_CREATED_AT.to_string(), created_at);

        self.put("set", &key, data, &attributes, cancel).await?;
        debug!(schema_id = %id, key = %key, "Stored schema in S3");
        Ok(())
    }
}

fn smithy_time(time: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<DateTime<Utc>> {
    time.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn backend_type(&self) -> StorageBackendType {
        StorageBackendType::S3
    }

    async fn get(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<Vec<u8>> {
        let data = self
            .fetch("get", &self.record_key(id), cancel)
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
        self.set_with_metadata(id, data, &HashMap::new(), cancel)
            .await
    }

    async fn delete(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        let key = self.record_key(id);
        if self.head("delete", &key, cancel).await?.is_none() {
            return Err(StorageError::not_found(id).into());
        }

        self.remove("delete", &key, cancel).await?;

        for tag in self.version_tags("delete", id, cancel).await? {
            if let Err(e) = self.remove("delete", &self.version_key(id, &tag), cancel).await {
                warn!(schema_id = %id, version = %tag, error = %e, "Failed to remove archived version");
            }
        }

        self.access.remove(id);
        Ok(())
    }

    async fn exists(&self, id: &str, cancel: &CancellationToken) -> SchemaRegistryResult<bool> {
        Ok(self
            .head("exists", &self.record_key(id), cancel)
            .await?
            .is_some())
    }

    async fn list(
        &self,
        filter: Option<&StorageFilter>,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        let ids = self
            .list_keys("list", &self.key_prefix, cancel)
            .await?
            .into_iter()
            .filter_map(|key| self.key_to_id(&key))
            .collect();
        Ok(apply_filter(ids, filter))
    }

    async fn get_version(
        &self,
        id: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<u8>> {
        self.fetch("get_version", &self.version_key(id, version), cancel)
            .await?
            .ok_or_else(|| StorageError::version_not_found(id, version).into())
    }

    async fn list_versions(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SchemaRegistryResult<Vec<String>> {
        self.version_tags("list_versions", id, cancel).await
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
        let head = self
            .head("get_metadata", &self.record_key(id), cancel)
            .await?
            .ok_or_else(|| StorageError::not_found(id))?;

        let attributes = head.metadata.clone().unwrap_or_default();
        let updated_at = smithy_time(head.last_modified.as_ref()).unwrap_or_else(Utc::now);
        let created_at = attributes
            .get(ATTR_CREATED_AT)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(updated_at);
        let access = self.access.get(id).map(|a| *a).unwrap_or_default();

        Ok(StorageMetadata {
            id: id.to_string(),
            size: head.content_length.unwrap_or_default().max(0) as u64,
            created_at,
            updated_at,
            access_count: access.count,
            last_access: access.last_access,
            version_count: self.version_tags("get_metadata", id, cancel).await?.len(),
            attributes,
        })
    }

    async fn health(&self, cancel: &CancellationToken) -> SchemaRegistryResult<()> {
        let probe = RetryPolicy {
            retries: 0,
            delay: Duration::ZERO,
            timeout: Some(HEALTH_PROBE_TIMEOUT),
        };
        probe
            .run("health", cancel, move || async move {
                self.s3_client
                    .head_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| sdk_error("health", e))
            })
            .await
    }
}
