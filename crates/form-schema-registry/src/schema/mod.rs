//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Schema definitions for the Schema Registry
//!
//! This module provides the schema document type and the id syntax
//! rules enforced before any backend is touched.

pub mod document;
pub mod id;

// Re-export main types for convenience
pub use document::{SchemaDocument, DEFAULT_SCHEMA_VERSION};
pub use id::{
    current_cache_key, id_to_relative_path, validate_schema_id, validate_version_tag,
    version_cache_key, MAX_SCHEMA_ID_LENGTH,
};
