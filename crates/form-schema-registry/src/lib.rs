//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Schema Registry for server-rendered forms
//!
//! This crate stores form and UI schema documents behind pluggable storage
//! backends (memory, filesystem, Redis, S3) with a two-tier read cache,
//! bounded version history, lifecycle events and operation metrics.
//!
//! ```no_run
//! use form_schema_registry::{SchemaDocument, SchemaRegistry, SchemaRegistryConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> form_schema_registry::SchemaRegistryResult<()> {
//! let registry = SchemaRegistry::new(SchemaRegistryConfig::default()).await?;
//! let cancel = CancellationToken::new();
//!
//! registry
//!     .register(&SchemaDocument::new("user.profile"), &cancel)
//!     .await?;
//! let document = registry.get("user.profile", &cancel).await?;
//! assert_eq!(document.version, "1.0.0");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod registry;
pub mod schema;
pub mod storage;
pub mod utils;
pub mod validation;

// Re-export main types
pub use cache::{CacheBackend, CacheStats, MemoryCache, RedisCache, TieredCache};
pub use codec::{JsonCodec, PayloadTransform, SchemaCodec};
pub use config::SchemaRegistryConfig;
pub use error::{SchemaRegistryError, SchemaRegistryResult};
pub use events::{EventHandler, RegistryEvent, RegistryEventKind};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use registry::{RegistryState, RegistryStats, SchemaRegistry, SchemaRegistryBuilder};
pub use schema::SchemaDocument;
pub use storage::{
    FileStorage, MemoryStorage, RedisStorage, S3Storage, StorageBackend, StorageError,
    StorageFilter, StorageMetadata,
};
pub use validation::{SchemaValidator, SchemaValidatorTrait, ValidationError, ValidationResult};

/// Schema Registry version
pub const SCHEMA_REGISTRY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Schema Registry name
pub const SCHEMA_REGISTRY_NAME: &str = "form-schema-registry";

/// Initialize the schema registry
pub async fn init_schema_registry(
    config: SchemaRegistryConfig,
) -> SchemaRegistryResult<SchemaRegistry> {
    SchemaRegistry::new(config).await
}

/// Shutdown the schema registry
pub async fn shutdown_schema_registry(registry: SchemaRegistry) -> SchemaRegistryResult<()> {
    registry.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_registry_creation() {
        let registry = init_schema_registry(SchemaRegistryConfig::default()).await;
        assert!(registry.is_ok());
    }

    #[tokio::test]
    async fn test_schema_registry_health_check() {
        let registry = init_schema_registry(SchemaRegistryConfig::default())
            .await
            .unwrap();
        let cancel = tokio_util::sync::CancellationToken::new();
        assert!(registry.health(&cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_schema_registry_shutdown() {
        let registry = init_schema_registry(SchemaRegistryConfig::default())
            .await
            .unwrap();
        assert!(shutdown_schema_registry(registry).await.is_ok());
    }
}
