//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Error handling for the Schema Registry
//!
//! This module provides error types and result aliases for the schema registry.

use thiserror::Error;

/// Result type for schema registry operations
pub type SchemaRegistryResult<T> = Result<T, SchemaRegistryError>;

/// Schema Registry error types
#[derive(Error, Debug)]
pub enum SchemaRegistryError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Storage error
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Network error talking to a remote backend
    #[error("Network error: {message}")]
    Network { message: String },

    /// Timeout error
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Cache error
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Validation error
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Schema validation failed
    #[error("Schema validation failed: {0:?}")]
    ValidationFailed(Vec<String>),

    /// Schema not found
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    /// Schema version not found
    #[error("Schema version not found: {id} version {version}")]
    VersionNotFound { id: String, version: String },

    /// Schema already exists
    #[error("Schema already exists: {0}")]
    SchemaAlreadyExists(String),

    /// Schema id failed the syntactic check
    #[error("Invalid schema id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Deserialization error
    #[error("Deserialization error: {message}")]
    Deserialization { message: String },

    /// Cancellation token fired
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// Feature switched off in configuration
    #[error("Feature disabled: {feature}")]
    FeatureDisabled { feature: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SchemaRegistryError {
    /// Create a configuration error
    pub fn config(message: &str) -> Self {
        Self::Config {
            message: message.to_string(),
        }
    }

    /// Create a storage error
    pub fn storage(message: &str) -> Self {
        Self::Storage {
            message: message.to_string(),
        }
    }

    /// Create a network error
    pub fn network(message: &str) -> Self {
        Self::Network {
            message: message.to_string(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: &str) -> Self {
        Self::Timeout {
            message: message.to_string(),
        }
    }

    /// Create a cache error
    pub fn cache(message: &str) -> Self {
        Self::Cache {
            message: message.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation(message: &str) -> Self {
        Self::Validation {
            message: message.to_string(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: &str) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    /// Create a deserialization error
    pub fn deserialization(message: &str) -> Self {
        Self::Deserialization {
            message: message.to_string(),
        }
    }

    /// Create a cancellation error for the named operation
    pub fn cancelled(operation: &str) -> Self {
        Self::Cancelled {
            operation: operation.to_string(),
        }
    }

    /// Create a feature disabled error
    pub fn feature_disabled(feature: &str) -> Self {
        Self::FeatureDisabled {
            feature: feature.to_string(),
        }
    }

    /// Create an invalid id error
    pub fn invalid_id(id: &str, reason: &str) -> Self {
        Self::InvalidId {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal(message: &str) -> Self {
        Self::Internal {
            message: message.to_string(),
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }

    /// Check if this error means the id or version is absent
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SchemaNotFound(_) | Self::VersionNotFound { .. }
        )
    }

    /// Check if this error was caused by cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<std::io::Error> for SchemaRegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SchemaRegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for SchemaRegistryError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for SchemaRegistryError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                message: err.to_string(),
            }
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
        {
            Self::Network {
                message: err.to_string(),
            }
        } else {
            Self::Storage {
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = SchemaRegistryError::config("test error");
        assert!(matches!(error, SchemaRegistryError::Config { .. }));

        let error = SchemaRegistryError::storage("storage error");
        assert!(matches!(error, SchemaRegistryError::Storage { .. }));

        let error = SchemaRegistryError::cancelled("list");
        assert!(error.is_cancelled());
        assert_eq!(error.to_string(), "Operation cancelled: list");
    }

    #[test]
    fn test_error_retryable() {
        assert!(SchemaRegistryError::network("connection reset").is_retryable());
        assert!(SchemaRegistryError::timeout("deadline elapsed").is_retryable());
        assert!(!SchemaRegistryError::storage("disk full").is_retryable());
        assert!(!SchemaRegistryError::SchemaNotFound("x".to_string()).is_retryable());
    }

    #[test]
    fn test_not_found_kinds() {
        assert!(SchemaRegistryError::SchemaNotFound("x".to_string()).is_not_found());
        assert!(SchemaRegistryError::VersionNotFound {
            id: "x".to_string(),
            version: "1".to_string(),
        }
        .is_not_found());
        assert!(!SchemaRegistryError::SchemaAlreadyExists("x".to_string()).is_not_found());
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: SchemaRegistryError = io.into();
        assert!(matches!(error, SchemaRegistryError::Storage { .. }));
    }
}
