//! Registry builder
//!
//! Backends not injected explicitly are created from configuration.

use crate::cache::{create_cache_backend, CacheBackend};
use crate::codec::{JsonCodec, PayloadTransform, SchemaCodec};
use crate::config::SchemaRegistryConfig;
use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use crate::registry::manager::SchemaRegistry;
use crate::registry::operations::DocumentPipeline;
use crate::storage::{create_storage_backend, StorageBackend};
use crate::validation::{SchemaValidator, SchemaValidatorTrait};
use std::sync::Arc;

/// Builder for [`SchemaRegistry`]
pub struct SchemaRegistryBuilder {
    config: SchemaRegistryConfig,
    storage: Option<Arc<dyn StorageBackend>>,
    cache: Option<Option<Arc<dyn CacheBackend>>>,
    codec: Option<Arc<dyn SchemaCodec>>,
    validator: Option<Arc<dyn SchemaValidatorTrait>>,
}

impl SchemaRegistryBuilder {
    pub fn new(config: SchemaRegistryConfig) -> Self {
        Self {
            config,
            storage: None,
            cache: None,
            codec: None,
            validator: None,
        }
    }

    /// Use this storage backend instead of the configured one
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use this cache instead of the configured one
    pub fn with_cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(Some(cache));
        self
    }

    /// Run without any cache regardless of configuration
    pub fn without_cache(mut self) -> Self {
        self.cache = Some(None);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn SchemaCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidatorTrait>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Validate the configuration and assemble the registry
    pub async fn build(self) -> SchemaRegistryResult<SchemaRegistry> {
        self.config
            .validate()
            .map_err(|e| SchemaRegistryError::config(&e))?;

        let transform = PayloadTransform::from_features(&self.config.features)?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => create_storage_backend(&self.config).await?,
        };

        let cache = match self.cache {
            Some(cache) => cache,
            None => create_cache_backend(&self.config.cache).await,
        };

        let pipeline = DocumentPipeline::new(
            self.codec.unwrap_or_else(|| Arc::new(JsonCodec::new())),
            transform,
            self.validator
                .unwrap_or_else(|| Arc::new(SchemaValidator::new())),
        );

        Ok(SchemaRegistry::assemble(self.config, storage, cache, pipeline).await)
    }
}
