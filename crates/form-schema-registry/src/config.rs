//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Configuration management for the Schema Registry
//!
//! This module provides configuration structures and validation for
//! the schema registry. Configuration is explicit and passed in at
//! construction; there is no process-wide state.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default filesystem base path
pub const DEFAULT_FILE_BASE_PATH: &str = "./schemas";

/// Default key prefix for the redis storage backend
pub const DEFAULT_REDIS_PREFIX: &str = "schema:";

/// Default key prefix for the object store backend
pub const DEFAULT_S3_PREFIX: &str = "schemas/";

/// Default key prefix for the distributed cache
pub const DEFAULT_CACHE_PREFIX: &str = "schema_cache:";

/// Schema Registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaRegistryConfig {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Cache configuration
    pub cache: CacheConfig,

    /// Feature switches
    pub features: FeaturesConfig,

    /// Monitoring configuration
    pub monitoring: MonitoringConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    #[serde(rename = "type")]
    pub backend: StorageBackendType,

    /// Key prefix for redis and object store backends
    pub key_prefix: Option<String>,

    /// Expiry applied to current records in seconds (0 = none, redis only)
    pub ttl_secs: u64,

    /// Per-attempt timeout for remote I/O in milliseconds
    pub timeout_ms: u64,

    /// Extra attempts for retryable remote errors
    pub retry_count: u32,

    /// Delay between retry attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Worker bound for batch fan-out
    pub batch_concurrency: usize,

    /// Backend specific settings
    pub backend_settings: HashMap<String, String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendType::Memory,
            key_prefix: None,
            ttl_secs: 0,
            timeout_ms: 5_000,
            retry_count: 2,
            retry_delay_ms: 100,
            batch_concurrency: 8,
            backend_settings: HashMap::new(),
        }
    }
}

/// Storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendType {
    /// In-memory storage
    Memory,

    /// Local filesystem storage
    File,

    /// Redis key-value storage
    Redis,

    /// S3 compatible object storage
    S3,
}

impl StorageBackendType {
    /// Name used in configuration files and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackendType::Memory => "memory",
            StorageBackendType::File => "file",
            StorageBackendType::Redis => "redis",
            StorageBackendType::S3 => "s3",
        }
    }

    /// Whether the backend is shared between processes
    pub fn is_distributed(&self) -> bool {
        matches!(self, StorageBackendType::Redis | StorageBackendType::S3)
    }
}

impl std::fmt::Display for StorageBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StorageBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackendType::Memory),
            "file" => Ok(StorageBackendType::File),
            "redis" => Ok(StorageBackendType::Redis),
            "s3" => Ok(StorageBackendType::S3),
            other => Err(format!("unsupported storage type: {}", other)),
        }
    }
}

/// Filesystem backend settings
#[derive(Debug, Clone, PartialEq)]
pub struct FileSettings {
    /// Root directory
    pub base_path: PathBuf,
}

/// Redis backend settings
#[derive(Debug, Clone, PartialEq)]
pub struct RedisSettings {
    /// Connection URL
    pub url: String,

    /// Key prefix
    pub key_prefix: String,

    /// Expiry of current records (None = no expiry)
    pub ttl: Option<Duration>,
}

/// Object store backend settings
#[derive(Debug, Clone, PartialEq)]
pub struct S3Settings {
    /// Bucket name
    pub bucket: String,

    /// Key prefix, always ending in '/'
    pub key_prefix: String,

    /// AWS region
    pub region: Option<String>,

    /// Custom endpoint (minio, localstack)
    pub endpoint_url: Option<String>,

    /// Static access key
    pub access_key_id: Option<String>,

    /// Static secret key
    pub secret_access_key: Option<String>,

    /// Use path-style addressing
    pub force_path_style: bool,
}

impl StorageConfig {
    fn setting(&self, key: &str) -> Option<String> {
        self.backend_settings
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Per-attempt timeout for remote I/O
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay between retry attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Filesystem settings with defaults applied
    pub fn file_settings(&self) -> FileSettings {
        FileSettings {
            base_path: PathBuf::from(
                self.setting("base_path")
                    .unwrap_or_else(|| DEFAULT_FILE_BASE_PATH.to_string()),
            ),
        }
    }

    /// Redis settings; `None` when no url is configured
    pub fn redis_settings(&self) -> Option<RedisSettings> {
        let url = self.setting("url")?;
        Some(RedisSettings {
            url,
            key_prefix: self
                .key_prefix
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_REDIS_PREFIX.to_string()),
            ttl: (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs)),
        })
    }

    /// Object store settings; `None` when no bucket is configured
    pub fn s3_settings(&self) -> Option<S3Settings> {
        let bucket = self.setting("bucket")?;
        let mut key_prefix = self
            .key_prefix
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_S3_PREFIX.to_string());
        if !key_prefix.ends_with('/') {
            key_prefix.push('/');
        }
        Some(S3Settings {
            bucket,
            key_prefix,
            region: self.setting("region"),
            endpoint_url: self.setting("endpoint_url"),
            access_key_id: self.setting("access_key_id"),
            secret_access_key: self.setting("secret_access_key"),
            force_path_style: self
                .setting("force_path_style")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the in-process cache
    pub enable_memory_cache: bool,

    /// TTL of current records in the in-process cache, in seconds
    pub memory_cache_ttl_secs: u64,

    /// Maximum number of in-process cache entries
    pub max_memory_cache_size: usize,

    /// Eviction policy when the in-process cache is full
    pub eviction_policy: EvictionPolicy,

    /// Interval of the expired-entry sweep in seconds (0 = lazy only)
    pub sweep_interval_secs: u64,

    /// Enable the distributed cache tier
    pub enable_distributed_cache: bool,

    /// TTL used by the distributed tier and for historical versions, in seconds
    pub distributed_cache_ttl_secs: u64,

    /// Redis URL of the distributed tier
    pub distributed_cache_url: Option<String>,

    /// Key prefix of the distributed tier
    pub distributed_cache_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_memory_cache: true,
            memory_cache_ttl_secs: 300,
            max_memory_cache_size: 1000,
            eviction_policy: EvictionPolicy::Lru,
            sweep_interval_secs: 60,
            enable_distributed_cache: false,
            distributed_cache_ttl_secs: 3600,
            distributed_cache_url: None,
            distributed_cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
        }
    }
}

impl CacheConfig {
    /// TTL of current records in the in-process cache
    pub fn memory_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_cache_ttl_secs)
    }

    /// TTL of the distributed tier and of historical versions
    pub fn distributed_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.distributed_cache_ttl_secs)
    }

    /// Whether any cache tier is enabled
    pub fn is_enabled(&self) -> bool {
        self.enable_memory_cache || self.enable_distributed_cache
    }
}

/// Cache eviction policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently used
    #[default]
    Lru,

    /// Least frequently used
    Lfu,

    /// Soonest to expire
    Ttl,
}

/// Feature switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Validate documents before they are written
    pub validate_on_store: bool,

    /// Validate documents after they are read
    pub validate_on_load: bool,

    /// Keep a history of overwritten documents
    pub enable_versioning: bool,

    /// Maximum history length per id
    pub max_versions: usize,

    /// Emit lifecycle events
    pub enable_events: bool,

    /// Record metrics
    pub enable_metrics: bool,

    /// Gzip payloads before they reach storage and cache
    pub enable_compression: bool,

    /// Encrypt payloads before they reach storage and cache
    pub enable_encryption: bool,

    /// Base64 encoded 32 byte AES-256-GCM key
    pub encryption_key: Option<String>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            validate_on_store: true,
            validate_on_load: true,
            enable_versioning: true,
            max_versions: 10,
            enable_events: true,
            enable_metrics: true,
            enable_compression: false,
            enable_encryption: false,
            encryption_key: None,
        }
    }
}

impl FeaturesConfig {
    /// Decode the configured encryption key
    pub fn decoded_encryption_key(&self) -> Result<Vec<u8>, String> {
        let encoded = self
            .encryption_key
            .as_deref()
            .ok_or_else(|| "encryption is enabled but no encryption_key is set".to_string())?;
        let key = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| format!("encryption_key is not valid base64: {}", e))?;
        if key.len() != 32 {
            return Err(format!(
                "encryption_key must decode to 32 bytes, got {}",
                key.len()
            ));
        }
        Ok(key)
    }
}

/// Monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Log level
    pub log_level: String,

    /// Log format
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,

    /// Text format
    Text,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Json => write!(f, "json"),
            LogFormat::Text => write!(f, "text"),
        }
    }
}

impl SchemaRegistryConfig {
    /// Load configuration from file
    pub fn from_file(path: &PathBuf) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("SCHEMA_REGISTRY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize().map_err(|e| match e {
            config::ConfigError::NotFound(key) => config::ConfigError::NotFound(format!(
                "{} (in config file: {})",
                key,
                path.display()
            )),
            config::ConfigError::FileParse { uri, cause } => config::ConfigError::FileParse {
                uri: Some(format!(
                    "{} (config file: {})",
                    uri.as_deref().unwrap_or("unknown"),
                    path.display()
                )),
                cause,
            },
            _ => e,
        })
    }

    /// Load configuration from multiple sources with precedence
    pub fn from_sources(
        config_file: Option<&PathBuf>,
        env_prefix: &str,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Defaults first
        builder = builder.add_source(config::File::from_str(
            &Self::generate_example(),
            config::FileFormat::Toml,
        ));

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path.as_ref()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?;
        settings.try_deserialize()
    }

    /// Load configuration with defaults
    pub fn load_with_defaults() -> Result<Self, config::ConfigError> {
        let config_paths = vec![
            PathBuf::from("config/schema-registry.toml"),
            PathBuf::from("schema-registry.toml"),
            PathBuf::from("config/schema-registry.yaml"),
            PathBuf::from("schema-registry.yaml"),
            PathBuf::from("config/schema-registry.json"),
            PathBuf::from("schema-registry.json"),
        ];

        for path in config_paths {
            if path.exists() {
                return Self::from_sources(Some(&path), "SCHEMA_REGISTRY");
            }
        }

        Self::from_sources(None, "SCHEMA_REGISTRY")
    }

    /// Generate example configuration
    pub fn generate_example() -> String {
        r#"# Schema Registry Configuration Example
# This file shows all available configuration options

[storage]
# Storage backend type: memory, file, redis, s3
type = "file"
ttl_secs = 0
timeout_ms = 5000
retry_count = 2
retry_delay_ms = 100
batch_concurrency = 8

[storage.backend_settings]
base_path = "./schemas"
# url = "redis://localhost:6379"
# bucket = "form-schemas"
# region = "us-east-1"
# endpoint_url = "http://localhost:9000"

[cache]
enable_memory_cache = true
memory_cache_ttl_secs = 300
max_memory_cache_size = 1000
eviction_policy = "lru"  # lru, lfu, ttl
sweep_interval_secs = 60
enable_distributed_cache = false
distributed_cache_ttl_secs = 3600
distributed_cache_prefix = "schema_cache:"

[features]
validate_on_store = true
validate_on_load = true
enable_versioning = true
max_versions = 10
enable_events = true
enable_metrics = true
enable_compression = false
enable_encryption = false

[monitoring]
log_level = "info"
log_format = "text"  # text, json
"#
        .to_string()
    }

    /// Validate the configuration, collecting every problem
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        self.validate_storage(&mut errors);
        self.validate_cache(&mut errors);
        self.validate_features(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    fn validate_storage(&self, errors: &mut Vec<String>) {
        let storage = &self.storage;

        if storage.batch_concurrency == 0 {
            errors.push("storage.batch_concurrency must be at least 1".to_string());
        }

        match storage.backend {
            StorageBackendType::Memory => {}
            StorageBackendType::File => {
                if storage.file_settings().base_path.as_os_str().is_empty() {
                    errors.push("storage.backend_settings.base_path must not be empty".to_string());
                }
            }
            StorageBackendType::Redis => {
                if storage.redis_settings().is_none() {
                    errors.push("storage.backend_settings.url is required for redis".to_string());
                }
            }
            StorageBackendType::S3 => {
                if storage.s3_settings().is_none() {
                    errors.push("storage.backend_settings.bucket is required for s3".to_string());
                }
            }
        }
    }

    fn validate_cache(&self, errors: &mut Vec<String>) {
        let cache = &self.cache;

        if cache.enable_memory_cache && cache.max_memory_cache_size == 0 {
            errors.push("cache.max_memory_cache_size must be at least 1".to_string());
        }

        if cache.enable_distributed_cache
            && cache
                .distributed_cache_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            errors.push(
                "cache.distributed_cache_url is required when the distributed cache is enabled"
                    .to_string(),
            );
        }
    }

    fn validate_features(&self, errors: &mut Vec<String>) {
        if self.features.enable_encryption {
            if let Err(e) = self.features.decoded_encryption_key() {
                errors.push(format!("features: {}", e));
            }
        }
    }
}
