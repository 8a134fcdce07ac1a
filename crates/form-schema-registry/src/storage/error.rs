//! Storage error types

use crate::error::SchemaRegistryError;

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Schema not found
    #[error("Schema not found: {id}")]
    SchemaNotFound { id: String },

    /// Archived version not found
    #[error("Schema version not found: {id} version {version}")]
    VersionNotFound { id: String, version: String },

    /// Invalid schema data
    #[error("Invalid schema data: {message}")]
    InvalidSchemaData { message: String },

    /// Storage connection error
    #[error("Storage connection error: {message}")]
    ConnectionError { message: String },

    /// Storage query error
    #[error("Storage query error: {message}")]
    QueryError { message: String },

    /// Storage transaction error
    #[error("Storage transaction error: {message}")]
    TransactionError { message: String },

    /// Storage timeout error
    #[error("Storage timeout error: {message}")]
    TimeoutError { message: String },

    /// Storage configuration error
    #[error("Storage configuration error: {message}")]
    ConfigurationError { message: String },
}

impl StorageError {
    /// Not found error for an id
    pub fn not_found(id: &str) -> Self {
        Self::SchemaNotFound { id: id.to_string() }
    }

    /// Not found error for an archived version
    pub fn version_not_found(id: &str, version: &str) -> Self {
        Self::VersionNotFound {
            id: id.to_string(),
            version: version.to_string(),
        }
    }

    /// Query error with context
    pub fn query(context: &str, err: impl std::fmt::Display) -> Self {
        Self::QueryError {
            message: format!("{}: {}", context, err),
        }
    }
}

impl From<StorageError> for SchemaRegistryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SchemaNotFound { id } => SchemaRegistryError::SchemaNotFound(id),
            StorageError::VersionNotFound { id, version } => {
                SchemaRegistryError::VersionNotFound { id, version }
            }
            StorageError::InvalidSchemaData { message } => {
                SchemaRegistryError::Validation { message }
            }
            StorageError::ConnectionError { message } => SchemaRegistryError::Network { message },
            StorageError::QueryError { message } => SchemaRegistryError::Storage { message },
            StorageError::TransactionError { message } => SchemaRegistryError::Storage { message },
            StorageError::TimeoutError { message } => SchemaRegistryError::Timeout { message },
            StorageError::ConfigurationError { message } => SchemaRegistryError::Config { message },
        }
    }
}
