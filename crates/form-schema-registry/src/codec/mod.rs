//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Document codec for the Schema Registry
//!
//! Translates schema documents to and from their canonical JSON form.
//! A partial parse never yields a document.

pub mod transform;

pub use transform::PayloadTransform;

use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use crate::schema::SchemaDocument;

/// Codec trait
pub trait SchemaCodec: Send + Sync {
    /// Codec name used in logs
    fn name(&self) -> &'static str;

    /// Encode a document into bytes
    fn encode(&self, document: &SchemaDocument) -> SchemaRegistryResult<Vec<u8>>;

    /// Decode bytes into a document
    fn decode(&self, bytes: &[u8]) -> SchemaRegistryResult<SchemaDocument>;
}

/// JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    /// Emit indented output
    pretty: bool,
}

impl JsonCodec {
    /// Create a compact JSON codec
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Create a codec emitting indented JSON
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl SchemaCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, document: &SchemaDocument) -> SchemaRegistryResult<Vec<u8>> {
        let reserved = document.reserved_content_keys();
        if !reserved.is_empty() {
            return Err(SchemaRegistryError::serialization(&format!(
                "document {} carries reserved content keys: {}",
                document.id,
                reserved.join(", ")
            )));
        }

        let encoded = if self.pretty {
            serde_json::to_vec_pretty(document)
        } else {
            serde_json::to_vec(document)
        };

        encoded.map_err(|e| {
            SchemaRegistryError::serialization(&format!(
                "failed to encode document {}: {}",
                document.id, e
            ))
        })
    }

    fn decode(&self, bytes: &[u8]) -> SchemaRegistryResult<SchemaDocument> {
        if bytes.is_empty() {
            return Err(SchemaRegistryError::deserialization("empty document"));
        }

        serde_json::from_slice(bytes).map_err(|e| {
            SchemaRegistryError::deserialization(&format!("failed to decode document: {}", e))
        })
    }
}
