//! Document pipeline
//!
//! Everything that happens to a document between the facade and a backend:
//! validation, codec and payload transforms. Bytes handed to storage and
//! cache are always the transformed form.

use crate::codec::{PayloadTransform, SchemaCodec};
use crate::error::SchemaRegistryResult;
use crate::schema::SchemaDocument;
use crate::validation::SchemaValidatorTrait;
use std::sync::Arc;
use tracing::debug;

/// Codec, transforms and validator used by the registry
pub struct DocumentPipeline {
    codec: Arc<dyn SchemaCodec>,
    transform: PayloadTransform,
    validator: Arc<dyn SchemaValidatorTrait>,
}

impl DocumentPipeline {
    pub fn new(
        codec: Arc<dyn SchemaCodec>,
        transform: PayloadTransform,
        validator: Arc<dyn SchemaValidatorTrait>,
    ) -> Self {
        Self {
            codec,
            transform,
            validator,
        }
    }

    /// Encode and transform a document for storage
    pub fn encode(&self, document: &SchemaDocument) -> SchemaRegistryResult<Vec<u8>> {
        let bytes = self.codec.encode(document)?;
        self.transform.apply(bytes)
    }

    /// Revert transforms and decode stored bytes
    pub fn decode(&self, bytes: Vec<u8>) -> SchemaRegistryResult<SchemaDocument> {
        let plain = self.transform.revert(bytes)?;
        self.codec.decode(&plain)
    }

    /// Run the validator, turning a failing result into an error
    pub async fn validate(&self, document: &SchemaDocument) -> SchemaRegistryResult<()> {
        let result = self.validator.validate_document(document).await?;
        if result.warning_count() > 0 {
            debug!(
                schema_id = %document.id,
                warnings = result.warning_count(),
                "Schema validated with warnings"
            );
        }
        result.into_result()
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec.name()
    }
}
