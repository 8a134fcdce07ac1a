//! Schema document
//!
//! The registry only interprets `id` and `version`; everything else is
//! carried as opaque JSON content.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version assigned to documents that do not carry one
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0.0";

fn default_version() -> String {
    DEFAULT_SCHEMA_VERSION.to_string()
}

/// Schema document representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Unique schema identifier, also the storage key
    pub id: String,

    /// Version tag of the document content
    #[serde(default = "default_version")]
    pub version: String,

    /// Remaining document content (fields, actions, layout, ...)
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl SchemaDocument {
    /// Create an empty document with the default version
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: default_version(),
            content: Map::new(),
        }
    }

    /// Set the version tag
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Add a top-level content field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.content.insert(key.into(), value);
        self
    }

    /// Look up a top-level content field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    /// Content keys that collide with the reserved `id`/`version` names
    pub fn reserved_content_keys(&self) -> Vec<&str> {
        ["id", "version"]
            .into_iter()
            .filter(|k| self.content.contains_key(*k))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_defaults_when_missing() {
        let doc: SchemaDocument = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert_eq!(doc.version, "1.0.0");
        assert!(doc.content.is_empty());
    }

    #[test]
    fn test_content_is_flattened() {
        let doc: SchemaDocument = serde_json::from_value(json!({
            "id": "user.profile",
            "version": "2.0.0",
            "title": "User",
            "fields": [{"name": "email"}]
        }))
        .unwrap();

        assert_eq!(doc.id, "user.profile");
        assert_eq!(doc.version, "2.0.0");
        assert_eq!(doc.field("title"), Some(&json!("User")));
        assert!(doc.reserved_content_keys().is_empty());

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["title"], json!("User"));
        assert_eq!(value["id"], json!("user.profile"));
    }

    #[test]
    fn test_reserved_keys_detected() {
        let doc = SchemaDocument::new("x").with_field("id", json!("other"));
        assert_eq!(doc.reserved_content_keys(), vec!["id"]);
    }
}
